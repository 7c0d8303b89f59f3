//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::file::RunSettings;
use crate::config::Continuation;

/// Test planning, scheduling and reporting engine
#[derive(Parser, Debug)]
#[command(name = "test-conductor")]
#[command(version)]
#[command(about = "Plan, run and report the bundled test suites")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run tests
    Run(RunArgs),

    /// Print the plan without running it
    List(ListArgs),

    /// Manage configuration files and profiles
    Config(ConfigArgs),
}

/// Selection flags shared by `run` and `list`
#[derive(Parser, Debug, Default)]
pub struct SelectionArgs {
    /// Only run tests whose id matches this pattern (repeatable)
    #[arg(short, long)]
    pub filter: Vec<String>,

    /// Skip tests whose id matches this pattern (repeatable)
    #[arg(short, long)]
    pub skip: Vec<String>,

    /// Only run tests with this tag (repeatable)
    #[arg(short, long)]
    pub tag: Vec<String>,

    /// Skip tests with this tag (repeatable)
    #[arg(long)]
    pub exclude_tag: Vec<String>,

    /// Include hidden tests
    #[arg(long)]
    pub include_hidden: bool,

    /// Configuration file (defaults to the standard locations)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Named profile from the configuration file or the predefined ones
    #[arg(short, long)]
    pub profile: Option<String>,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Output format (console, junit, abi)
    #[arg(long)]
    pub format: Option<String>,

    /// ABI record version for `--format abi`
    #[arg(long)]
    pub abi_version: Option<u32>,

    /// Run every test sequentially
    #[arg(long, conflicts_with = "concurrent")]
    pub serial: bool,

    /// Maximum concurrently running tests
    #[arg(short = 'j', long)]
    pub concurrent: Option<usize>,

    /// Number of iterations of the whole plan
    #[arg(short, long)]
    pub iterations: Option<usize>,

    /// When to repeat (always, while-failing, until-failing)
    #[arg(long)]
    pub repeat: Option<String>,

    /// Default per-case time limit in seconds
    #[arg(long)]
    pub time_limit: Option<f64>,

    /// Also write a JUnit report to this file
    #[arg(long)]
    pub junit_output: Option<PathBuf>,

    /// Post an event for every checked expectation
    #[arg(long)]
    pub expectation_events: bool,

    /// Disable colored console output
    #[arg(long)]
    pub no_color: bool,
}

impl RunArgs {
    /// The settings these flags override
    pub fn to_settings(&self) -> anyhow::Result<RunSettings> {
        let continuation = self
            .repeat
            .as_deref()
            .map(|s| {
                Continuation::from_str(s).ok_or_else(|| anyhow::anyhow!("Unknown repeat mode: {s}"))
            })
            .transpose()?;

        Ok(RunSettings {
            parallel: self.serial.then_some(false),
            max_concurrent: self.concurrent,
            iterations: self.iterations,
            continuation,
            time_limit_secs: self.time_limit,
            format: self.format.clone(),
            abi_version: self.abi_version,
            junit_output: self.junit_output.clone(),
            expectation_events: self.expectation_events.then_some(true),
            ..self.selection.to_settings()
        })
    }
}

impl SelectionArgs {
    pub fn to_settings(&self) -> RunSettings {
        RunSettings {
            filter: self.filter.clone(),
            skip: self.skip.clone(),
            tags: self.tag.clone(),
            exclude_tags: self.exclude_tag.clone(),
            include_hidden: self.include_hidden.then_some(true),
            ..RunSettings::default()
        }
    }
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Also list the registered exit tests
    #[arg(short, long)]
    pub exit_tests: bool,
}

/// Arguments for config management
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "./test-conductor.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration file or environment overrides
    Show {
        /// Show environment variables instead
        #[arg(short, long)]
        env: bool,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the standard locations)
        file: Option<PathBuf>,
    },

    /// List available profiles
    Profiles {
        /// Show each profile's settings
        #[arg(short, long)]
        detailed: bool,
    },
}
