//! codecheck CLI
//!
//! Runs the analysis server, or analyzes a single file from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codecheck::{AnalysisEngine, AppState, Config, Priority, ResultProjector, RuleSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "codecheck",
    version,
    about = "Static code analysis service",
    long_about = "Runs a bundle of code quality rules over submitted snippets and reports line-numbered findings."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "CODECHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Rule bundle (quickstart, c-quickstart)
    #[arg(long, global = true, env = "CODECHECK_BUNDLE")]
    bundle: Option<String>,

    /// Minimum priority to report (high, medium-high, medium, medium-low, low or 1-5)
    #[arg(long, global = true, env = "CODECHECK_MIN_PRIORITY")]
    min_priority: Option<Priority>,

    /// Port to listen on
    #[arg(short, long, global = true, env = "CODECHECK_PORT")]
    port: Option<u16>,

    /// Include rule name and priority in results
    #[arg(long, global = true, env = "CODECHECK_VERBOSE_RESULTS")]
    verbose_results: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default)
    Serve,

    /// Analyze a file ("-" for stdin) and print the response envelope
    Check {
        /// File to analyze
        file: PathBuf,
    },

    /// List the resolved rules
    Rules,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            Config::load_default(&cwd).context("Failed to load default config")?
        }
    };

    config.merge_cli(
        cli.bundle.clone(),
        cli.min_priority,
        cli.port,
        cli.verbose_results.then_some(true),
    );
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_engine(config: &Config) -> Result<AnalysisEngine> {
    let rules = RuleSet::from_config(&config.engine, &config.rules)
        .context("Failed to resolve rule set")?;
    AnalysisEngine::new(rules, &config.engine).context("Failed to create analysis engine")
}

fn read_input(file: &Path) -> Result<String> {
    if file.as_os_str() == "-" {
        let mut code = String::new();
        std::io::stdin()
            .read_to_string(&mut code)
            .context("Failed to read stdin")?;
        Ok(code)
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging(&config.server.log_level);

    let engine = build_engine(&config)?;
    let projector = ResultProjector::new(config.server.verbose_results);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(
                bundle = engine.rule_set().name(),
                rules = engine.rule_set().len(),
                minimum_priority = %engine.rule_set().minimum_priority(),
                "starting codecheck"
            );
            codecheck::server::serve(
                &config.server.host,
                config.server.port,
                AppState::new(engine, projector),
            )
            .await
            .context("Server error")?;
        }
        Command::Check { file } => {
            let code = read_input(&file)?;
            let result = tokio::task::spawn_blocking(move || engine.analyze(&code))
                .await
                .context("Analysis task failed")?;

            let (response, ok) = match result {
                Ok(report) => (projector.success(&report), true),
                Err(e) => (projector.failure(&e), false),
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !ok {
                std::process::exit(1);
            }
        }
        Command::Rules => {
            let set = engine.rule_set();
            println!(
                "Bundle: {} ({}), minimum priority: {}",
                set.name(),
                set.language(),
                set.minimum_priority()
            );
            for rule in set.rules() {
                println!("  {:<30} {:<12} {}", rule.name(), rule.priority(), rule.description());
            }
        }
    }

    Ok(())
}
