//! Test Conductor - host binary
//!
//! Plans and runs the bundled suites, writing console lines, JUnit XML or
//! ABI records to stdout. The same binary is re-launched as the child
//! process of every exit test.
//!
//! ## Usage
//!
//! ```bash
//! # Run everything
//! test-conductor run
//!
//! # Run the smoke tests serially, three times
//! test-conductor run --tag smoke --serial --iterations 3
//!
//! # Stream ABI records for another tool
//! test-conductor run --format abi --abi-version 1
//!
//! # Show the plan
//! test-conductor list --include-hidden
//!
//! # Write an example configuration file
//! test-conductor config init
//! ```

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use test_conductor::cli::{self, Args};
use test_conductor::config::env::EnvConfig;
use test_conductor::config::file::{ConfigFile, RunSettings};
use test_conductor::config::profile::RunProfile;
use test_conductor::events::{abi, fallback, EventBus};
use test_conductor::exit_test::{ProcessSpawner, ReentryRequest};
use test_conductor::models::SkipInfo;
use test_conductor::output::{
    write_junit_to_file, ConsoleRecorder, JUnitRecorder, OutputFormat, ResultFormatter,
    SummaryRecorder,
};
use test_conductor::planner::Plan;
use test_conductor::utils::{init_logger, LogLevel};
use test_conductor::{suites, Runner};

#[tokio::main]
async fn main() -> Result<()> {
    // A re-entered exit-test child runs exactly one body and exits.
    if let Some(request) = ReentryRequest::from_env() {
        let code = request.run(&suites::exit_tests()).await;
        std::process::exit(code);
    }

    let args = Args::parse();
    let env = EnvConfig::load();
    let verbose = args.verbose || env.verbose.unwrap_or(false);
    let level = env
        .log_level
        .as_deref()
        .and_then(LogLevel::from_str)
        .unwrap_or_else(|| LogLevel::from_verbose(verbose));
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            if run_tests(run_args, &env, verbose).await? {
                std::process::exit(1);
            }
        }
        cli::Command::List(list_args) => {
            list_tests(list_args, &env).await?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args)?;
        }
    }

    Ok(())
}

/// Layer the config file, the selected profile, the environment and `overrides`
fn load_settings(
    selection: &cli::SelectionArgs,
    env: &EnvConfig,
    overrides: RunSettings,
) -> Result<RunSettings> {
    let path = selection
        .config
        .clone()
        .or_else(|| env.config_file.as_ref().map(PathBuf::from));
    let file = match &path {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::load_default()?,
    };

    let mut settings = file.run.clone();
    if let Some(name) = selection.profile.as_ref().or(env.profile.as_ref()) {
        let profile = file
            .profile(name)
            .ok_or_else(|| anyhow!("Unknown profile: {name}"))?;
        info!("Using profile '{}'", profile.name);
        settings.merge(profile.settings);
    }
    if env.has_any() {
        settings.merge(env.to_settings());
    }
    settings.merge(overrides);
    settings.validate()?;
    Ok(settings)
}

/// Run the bundled suites; returns true if the run failed
async fn run_tests(args: cli::RunArgs, env: &EnvConfig, verbose: bool) -> Result<bool> {
    let settings = load_settings(&args.selection, env, args.to_settings()?)?;
    let format = match settings.format.as_deref() {
        Some(name) => {
            OutputFormat::from_str(name).ok_or_else(|| anyhow!("Unknown output format: {name}"))?
        }
        None => OutputFormat::Console,
    };
    let abi_version = settings.abi_version.unwrap_or(abi::CURRENT_VERSION);

    let summary = SummaryRecorder::new();
    let bus = EventBus::new().subscribe("summary", summary.handler());
    let bus = match format {
        OutputFormat::Console => {
            let mut console = ConsoleRecorder::stdout();
            if args.no_color {
                console = console.no_color();
            }
            if verbose {
                console = console.verbose();
            }
            bus.subscribe("console", console.into_handler())
        }
        OutputFormat::Junit => {
            bus.subscribe("junit", JUnitRecorder::new(std::io::stdout()).into_handler())
        }
        OutputFormat::Abi => bus.subscribe("abi", abi::abi_handler(std::io::stdout(), abi_version)?),
    };
    let handler = bus.into_handler();
    fallback::install(handler.clone());

    let spawner = ProcessSpawner::current_exe()?.with_abi_version(abi_version)?;
    let configuration = settings
        .to_configuration()?
        .with_event_handler(handler)
        .with_exit_test_handler(Arc::new(spawner));

    let runner = Runner::new(suites::registry().into_tests(), configuration).await;
    let token = runner.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the run");
            token.cancel_with(SkipInfo::with_comment("Interrupted"));
        }
    });

    let outcome = runner.run().await;
    interrupt.abort();
    fallback::reset();

    let summary = summary.summary();
    if let Some(path) = &settings.junit_output {
        write_junit_to_file(path, &summary)?;
        info!("JUnit report written to {}", path.display());
    }
    if verbose && format == OutputFormat::Console {
        let mut formatter = ResultFormatter::new();
        if args.no_color {
            formatter = formatter.no_color();
        }
        print!("{}", formatter.format_summary_table(&summary));
    }

    Ok(outcome.is_failure())
}

async fn list_tests(args: cli::ListArgs, env: &EnvConfig) -> Result<()> {
    let settings = load_settings(&args.selection, env, args.selection.to_settings())?;
    let plan = Plan::build(suites::registry().into_tests(), &settings.build_filter()?).await;

    if plan.is_empty() {
        println!("No tests matched.");
    } else {
        println!("Planned steps:");
        println!("{:-<60}", "");
        print!("{}", plan.dump());
        println!("{:-<60}", "");
        println!(
            "{} steps, {} test functions",
            plan.steps().len(),
            plan.independently_runnable_steps().len()
        );
    }

    if args.exit_tests {
        println!("\nExit tests:");
        for id in suites::exit_tests().ids() {
            println!("  - {id}");
        }
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    output.display()
                );
            }

            ConfigFile::example().save(&output)?;
            println!("✓ Configuration file created: {}", output.display());
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { env, format } => {
            if env {
                EnvConfig::load().print_summary();
            } else {
                let config = ConfigFile::load_default()?;
                let output = if format == "json" {
                    serde_json::to_string_pretty(&config)?
                } else {
                    serde_yaml::to_string(&config)?
                };
                println!("{output}");
            }
        }

        cli::ConfigAction::Validate { file } => {
            let path = file
                .or_else(ConfigFile::find)
                .unwrap_or_else(|| PathBuf::from("./test-conductor.yaml"));

            match ConfigFile::load(&path) {
                Ok(_) => {
                    println!("✓ Configuration file is valid: {}", path.display());
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {}", path.display());
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }

        cli::ConfigAction::Profiles { detailed } => {
            let file = ConfigFile::load_default()?;
            let mut profiles = file.profiles.clone();
            for predefined in RunProfile::predefined() {
                if !profiles.iter().any(|p| p.name == predefined.name) {
                    profiles.push(predefined);
                }
            }

            println!("Run Profiles:");
            println!("{:-<60}", "");
            for profile in profiles {
                if detailed {
                    println!("  {}", profile.name);
                    println!("    {}", profile.description);
                    println!("    {}", serde_json::to_string(&profile.settings)?);
                    println!();
                } else {
                    println!("  {:12} - {}", profile.name, profile.description);
                }
            }
        }
    }

    Ok(())
}
