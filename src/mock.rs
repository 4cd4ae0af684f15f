/// Mock forecast utilities for demo and test countries
///
/// When a profile sets `mock = true` the supplied forecast is ignored and
/// replaced by a synthetic one, so dashboards and notification paths can
/// be exercised without a live GloFAS feed. This only selects the data
/// source; whether untriggered units are forced is governed separately by
/// `if_mock_trigger`.

use crate::countries::CountryProfile;
use crate::model::ForecastStation;

/// Configuration for mock forecast generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockForecast {
    /// Probability assigned to every station at every lead time
    pub probability: f64,
}

impl MockForecast {
    /// Mock forecast at the profile's `maximum` threshold, so every
    /// monitored unit lands in the top band.
    pub fn for_profile(profile: &CountryProfile) -> Self {
        Self {
            probability: profile.thresholds().maximum,
        }
    }

    /// Returns the stations with their probabilities replaced by mock
    /// values for every configured lead time. Station metadata (location,
    /// hydrological order, drainage area) is kept so the mapping is the
    /// same as for live data.
    pub fn apply(&self, profile: &CountryProfile, stations: &[ForecastStation]) -> Vec<ForecastStation> {
        stations
            .iter()
            .map(|station| ForecastStation {
                probabilities: profile
                    .lead_times()
                    .iter()
                    .map(|lt| (lt.name.clone(), self.probability))
                    .collect(),
                ..station.clone()
            })
            .collect()
    }
}
