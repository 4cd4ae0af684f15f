use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;

use ibf_flood_engine::config::EngineConfig;
use ibf_flood_engine::credentials::{
    ChainedCredentialProvider, CredentialProvider, EnvCredentialProvider, FileCredentialProvider,
};
use ibf_flood_engine::engine::{self, EngineError, RunOptions};
use ibf_flood_engine::ingest::load_bundle;
use ibf_flood_engine::logging::{Stage, init_logger};
use ibf_flood_engine::report::{RunReport, print_summary, write_json_lines};

#[derive(Parser, Debug)]
#[command(
    name = "ibf-flood-engine",
    about = "Evaluate river-flood triggers and exposed population for one forecast run",
    version
)]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(long)]
    config: PathBuf,
    /// Run bundle with forecasts, boundaries and exposure datasets (JSON)
    #[arg(long)]
    input: PathBuf,
    /// JSON-lines output; overrides the configured path, default stdout
    #[arg(long)]
    output: Option<PathBuf>,
    /// Run clock (RFC 3339), for replaying a past run
    #[arg(long)]
    now: Option<DateTime<Utc>>,
    /// Skip the console summary (never printed when writing to stdout)
    #[arg(long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match EngineConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logger(
        &config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    ) {
        eprintln!("cannot initialise logging: {}", e);
        return ExitCode::FAILURE;
    }

    match execute(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!(stage = %Stage::System, "{}", message);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli, config: &EngineConfig) -> Result<(), String> {
    let registry = config.registry().map_err(|e| e.to_string())?;
    tracing::info!(
        stage = %Stage::Registry,
        countries = ?registry.list_countries().iter().map(|c| c.as_str()).collect::<Vec<_>>(),
        "country profiles loaded"
    );

    resolve_credentials(config)?;

    let (input, catalog) = load_bundle(&cli.input).map_err(|e| e.to_string())?;

    let options = RunOptions {
        max_forecast_age_hours: config.max_forecast_age_hours,
        workers: config.workers,
        ..RunOptions::at(cli.now.unwrap_or_else(Utc::now))
    };

    let report = match engine::run(&registry, &input, &catalog, &options) {
        Ok(report) => report,
        Err(EngineError::NothingEvaluated(diagnostics)) => {
            // Still publish the diagnostics so the surrounding job can see why.
            let report = RunReport::new(options.now, Vec::new(), *diagnostics);
            write_report(cli, config, &report)?;
            return Err("no unit was evaluated in any country".to_string());
        }
        Err(e) => return Err(e.to_string()),
    };

    let to_file = write_report(cli, config, &report)?;
    if to_file && !cli.quiet {
        print_summary(&report);
    }
    Ok(())
}

fn resolve_credentials(config: &EngineConfig) -> Result<(), String> {
    let mut providers: Vec<Box<dyn CredentialProvider>> =
        vec![Box::new(EnvCredentialProvider::from_process_env())];
    if let Some(path) = &config.secrets_file {
        providers.push(Box::new(FileCredentialProvider::new(path)));
    }
    let chain = ChainedCredentialProvider::new(providers);

    match chain.resolve() {
        Ok(credentials) => {
            tracing::debug!(ibf_url = %credentials.ibf_url, "delivery credentials available");
            Ok(())
        }
        Err(e) if config.require_credentials => Err(e.to_string()),
        Err(e) => {
            tracing::warn!("continuing without delivery credentials: {}", e);
            Ok(())
        }
    }
}

/// Returns `true` if the report went to a file.
fn write_report(cli: &Cli, config: &EngineConfig, report: &RunReport) -> Result<bool, String> {
    match cli.output.as_ref().or(config.output.as_ref()) {
        Some(path) => {
            let file = File::create(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
            write_json_lines(report, BufWriter::new(file)).map_err(|e| e.to_string())?;
            tracing::info!(path = %path.display(), records = report.records.len(), "report written");
            Ok(true)
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_json_lines(report, &mut lock).map_err(|e| e.to_string())?;
            lock.flush().map_err(|e| e.to_string())?;
            Ok(false)
        }
    }
}
