use anyhow::{anyhow, Context};
use cascade_runtime::{generate_dad_joke, PlanConfig, ProviderRegistry};
use clap::{ArgAction, Parser};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cascade")]
#[command(about = "Ask an LLM for a dad joke, falling back across providers")]
struct Cli {
    /// Plan file (YAML, or JSON by extension). Defaults to gpt-4o then Claude.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON file of per-provider settings, e.g. {"openai": {"api_key": "..."}}
    #[arg(long)]
    provider_settings: Option<PathBuf>,

    #[arg(long, default_value = "dad-joke.txt")]
    output: PathBuf,

    /// Print the joke instead of writing it to a file.
    #[arg(long = "no-write", action = ArgAction::SetTrue)]
    no_write: bool,

    /// Custom user prompt.
    #[arg(long)]
    prompt: Option<String>,

    /// Give up after this long, e.g. "20s".
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Print the resolved plan and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    check: bool,

    /// -v for info, -vv for debug. RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_plan(cli.config.as_deref())?;
    let settings = load_settings(cli.provider_settings.as_deref())?;
    let registry = ProviderRegistry::with_defaults();

    if cli.check {
        for line in describe(&config, &registry, &settings) {
            println!("{line}");
        }
        return Ok(());
    }

    let plan = config
        .build(&registry, &settings)
        .context("failed to build execution plan")?;

    let generation = generate_dad_joke(&plan, cli.prompt.as_deref(), interrupted());
    let completion = match cli.timeout {
        Some(limit) => tokio::time::timeout(limit, generation)
            .await
            .map_err(|_| anyhow!("no joke within {}", humantime::format_duration(limit)))??,
        None => generation.await?,
    };

    let joke = completion.value.content.trim();
    if cli.no_write {
        println!("{joke}");
    } else {
        write_joke(&cli.output, joke)?;
        println!("Dad joke written to {}", cli.output.display());
    }
    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::warn!("Interrupted, cancelling execution plan");
}

fn load_plan(path: Option<&Path>) -> anyhow::Result<PlanConfig> {
    match path {
        Some(path) => PlanConfig::from_file(path)
            .with_context(|| format!("failed to load plan from {}", path.display())),
        None => Ok(PlanConfig::default()),
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<JsonValue> {
    let Some(path) = path else {
        return Ok(JsonValue::Null);
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read provider settings from {}", path.display()))?;
    let settings: JsonValue = serde_json::from_str(&content)
        .with_context(|| format!("invalid provider settings in {}", path.display()))?;
    if !settings.is_object() {
        return Err(anyhow!(
            "provider settings in {} must be a JSON object",
            path.display()
        ));
    }
    Ok(settings)
}

/// One line per step with its settings status, without building clients.
fn describe(
    config: &PlanConfig,
    registry: &ProviderRegistry,
    settings: &JsonValue,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(config.steps.len());
    for (index, step) in config.steps.iter().enumerate() {
        let provider = step.provider.as_str();
        let model = step
            .model
            .as_deref()
            .or_else(|| registry.default_model(provider))
            .unwrap_or("unknown");
        let status = match registry.validate(provider, &settings[provider]) {
            Ok(()) => "ready".to_string(),
            Err(error) => format!("not ready: {error}"),
        };
        let retry_on: Vec<String> = step.retry_on.iter().map(ToString::to_string).collect();
        lines.push(format!(
            "step {index}: {provider}/{model} ({} attempt(s), retry on [{}]) {status}",
            step.attempts,
            retry_on.join(", ")
        ));
    }
    lines
}

fn write_joke(path: &Path, joke: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, format!("{joke}\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}
