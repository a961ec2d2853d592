use anyhow::{Context, Result};
use clap::Parser;
use stampede_config::{ConfigError, ConfigLoader, LogLevel, StampedeConfig};
use stampede_http::{http_scenario, HttpError};
use stampede_logging::{init_logging_from_config, init_simple_tracing};
use stampede_runtime::{
    interrupt_on_shutdown_signal, AbortSignal, LoadTest, RunError, EXIT_INVALID_CONFIG, EXIT_OK,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

mod cli;
use cli::{Cli, Commands, ConfigCommands};

/// Exit code for failures outside the run contract
const EXIT_FAILURE: i32 = 1;

fn load_config(path: &Path) -> Result<StampedeConfig> {
    ConfigLoader::new()
        .from_file(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))
}

/// Simple console tracing; reports failure on stderr and returns whether it worked
fn init_fallback_tracing(log_level: Option<&str>) -> bool {
    match init_simple_tracing(log_level.unwrap_or("info")) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {}", e);
            false
        }
    }
}

/// Initialize logging from configuration with fallback to simple tracing
fn init_logging(config: Option<&StampedeConfig>, log_level: Option<&str>) {
    let Some(config) = config else {
        init_fallback_tracing(log_level);
        return;
    };

    // If CLI log level is provided, override config level
    let mut logging = config.logging.clone();
    if let Some(level) = log_level {
        match level.parse::<LogLevel>() {
            Ok(level) => logging.level = level,
            Err(e) => eprintln!("{}, keeping '{}'", e, logging.level),
        }
    }

    if let Err(e) = init_logging_from_config(&logging) {
        eprintln!(
            "Failed to initialize structured logging: {}, falling back to simple tracing",
            e
        );
        init_fallback_tracing(log_level);
    }
}

/// Exit code for an error that ended a command before a run summary existed
fn exit_code_for_error(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| {
            if let Some(run_error) = cause.downcast_ref::<RunError>() {
                Some(run_error.exit_code())
            } else if cause.is::<ConfigError>() || cause.is::<HttpError>() {
                Some(EXIT_INVALID_CONFIG)
            } else {
                None
            }
        })
        .unwrap_or(EXIT_FAILURE)
}

struct RunArgs<'a> {
    config: &'a Path,
    scenario: Option<&'a str>,
    env: &'a [(String, String)],
    summary_export: Option<&'a PathBuf>,
    seed: Option<u64>,
    quiet: bool,
}

async fn run_command(args: RunArgs<'_>, log_level: Option<&str>) -> Result<i32> {
    let loaded = load_config(args.config);
    init_logging(loaded.as_ref().ok(), log_level);
    let mut config = loaded?;

    if let Some(seed) = args.seed {
        config.options.seed = Some(seed);
    }
    let explicit: BTreeMap<String, String> = args.env.iter().cloned().collect();

    let (lifecycle, iteration) =
        http_scenario(config.http.clone()).context("Failed to create HTTP client")?;
    let abort = AbortSignal::new();
    let test = LoadTest::builder(iteration)
        .lifecycle(lifecycle)
        .abort_signal(abort.clone())
        .configure(&config, args.scenario, &explicit)?
        .build()?;

    info!(
        scenarios = test.scenarios().len(),
        thresholds = test.thresholds().len(),
        run = test.env().active_scenario(),
        "Stampede run starting"
    );
    let signals = tokio::spawn(interrupt_on_shutdown_signal(abort));

    let summary = test.run().await;
    signals.abort();

    if !args.quiet {
        println!("{}", summary.render_text());
    }
    let export = args
        .summary_export
        .cloned()
        .or_else(|| config.options.summary_export.clone());
    if let Some(path) = export {
        match summary.write_to(&path) {
            Ok(()) => info!(path = %path.display(), "Summary exported"),
            Err(e) => {
                error!(error = %e, "Failed to export summary");
                eprintln!("Failed to export summary: {}", e);
            }
        }
    }

    info!(exit_code = summary.exit_code, passed = summary.passed, "Stampede run finished");
    Ok(summary.exit_code)
}

fn handle_validate(config_path: &Path, log_level: Option<&str>) -> Result<i32> {
    init_logging(None, log_level);
    info!("Validating configuration file: {:?}", config_path);

    let result = load_config(config_path).and_then(|config| {
        let scenarios = config.scenario_specs(None)?;
        let thresholds = config.threshold_set()?;
        http_scenario(config.http.clone())?;
        Ok((scenarios, thresholds))
    });

    match result {
        Ok((scenarios, thresholds)) => {
            println!(
                "Configuration is valid: {} scenario(s), {} threshold(s)",
                scenarios.len(),
                thresholds.len()
            );
            for spec in &scenarios {
                println!(
                    "  {:<16} {:<20} starts at {:?}, runs {:?}",
                    spec.name,
                    spec.executor.kind().as_str(),
                    spec.start_offset,
                    spec.executor.total_duration()
                );
            }
            Ok(EXIT_OK)
        }
        Err(e) => {
            println!("Configuration validation failed: {:#}", e);
            error!("Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

fn handle_config_generate(output: Option<&PathBuf>, force: bool) -> Result<i32> {
    let content = StampedeConfig::generate_sample();
    let Some(output) = output else {
        print!("{}", content);
        return Ok(EXIT_OK);
    };

    info!("Generating sample configuration at: {:?}", output);
    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    fs::write(output, content)
        .with_context(|| format!("Failed to write configuration to {:?}", output))?;
    println!("Sample configuration written to {}", output.display());
    Ok(EXIT_OK)
}

fn handle_config_show(config_path: &Path, format: &str) -> Result<i32> {
    let config = load_config(config_path)?;
    let rendered = match format.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::to_string(&config).context("Failed to render YAML")?,
        "json" => serde_json::to_string_pretty(&config).context("Failed to render JSON")?,
        other => {
            warn!("Unknown format '{}'", other);
            return Err(anyhow::anyhow!(
                "Unknown format: {}. Valid formats: yaml, json",
                other
            ));
        }
    };
    println!("{}", rendered);
    Ok(EXIT_OK)
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let log_level = cli.log_level.as_deref();
    match &cli.command {
        Commands::Run {
            config,
            scenario,
            env,
            summary_export,
            seed,
            quiet,
        } => {
            let args = RunArgs {
                config,
                scenario: scenario.as_deref(),
                env,
                summary_export: summary_export.as_ref(),
                seed: *seed,
                quiet: *quiet,
            };
            run_command(args, log_level).await
        }
        Commands::Validate { config } => handle_validate(config, log_level),
        Commands::Config { config_cmd } => {
            init_logging(None, log_level);
            match config_cmd {
                ConfigCommands::Generate { output, force } => {
                    handle_config_generate(output.as_ref(), *force)
                }
                ConfigCommands::Show { config, format } => handle_config_show(config, format),
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            let code = exit_code_for_error(&e);
            debug!(exit_code = code, "Command failed");
            eprintln!("Error: {:#}", e);
            code
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_exit_codes() {
        let missing = load_config(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert_eq!(exit_code_for_error(&missing), EXIT_INVALID_CONFIG);

        let other = anyhow::anyhow!("disk full");
        assert_eq!(exit_code_for_error(&other), EXIT_FAILURE);

        let invalid = anyhow::Error::new(ConfigError::ValidationError("no scenarios".into()))
            .context("Failed to load configuration");
        assert_eq!(exit_code_for_error(&invalid), EXIT_INVALID_CONFIG);
    }

    #[test]
    fn test_fallback_tracing_reports_outcome() {
        assert!(init_fallback_tracing(Some("warn")));
        // a second global subscriber is skipped, not an error
        assert!(init_fallback_tracing(None));
    }

    #[test]
    fn test_invalid_config_file_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        fs::write(&path, "scenarios: {}\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert_eq!(exit_code_for_error(&err), EXIT_INVALID_CONFIG);
    }

    #[test]
    fn test_generated_sample_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs").join("stampede.yaml");
        assert_eq!(handle_config_generate(Some(&path), false).unwrap(), EXIT_OK);
        assert!(handle_config_generate(Some(&path), false).is_err());
        assert_eq!(handle_config_generate(Some(&path), true).unwrap(), EXIT_OK);

        let config = load_config(&path).unwrap();
        assert_eq!(config.scenario_specs(None).unwrap().len(), 5);
    }
}
