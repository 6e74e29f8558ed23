use std::path::PathBuf;

use anyhow::{Context, Result};
use business_reports::config::{default_config_path, Config};
use business_reports::credentials::Settings;
use business_reports::models::ReportDateRange;
use business_reports::Runner;
use clap::Parser;
use futures::StreamExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "business-reports")]
#[command(about = "Download seller dashboard business reports as JSON lines")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Date range to extract, e.g. 2024-01-01:2024-01-31. Repeatable;
    /// overrides `dates` from the config file.
    #[arg(long = "range", value_name = "START:END")]
    ranges: Vec<String>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off",
            )
        }))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .json(),
        )
        .init();
}

async fn resolve_settings(config: &mut Config) -> Result<Settings> {
    if let Some(settings) = config.settings.take() {
        return Ok(settings);
    }
    match &config.credentials {
        Some(credentials) => {
            let store = credentials.build();
            Settings::from_store(store.as_ref())
                .await
                .context("Failed to resolve credentials")
        }
        None => Ok(Settings::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = Config::load_or_default(&config_path)?;
    if cli.headful {
        config.browser.headless = false;
    }

    let ranges = if cli.ranges.is_empty() {
        config.date_ranges()?
    } else {
        cli.ranges
            .iter()
            .map(|r| ReportDateRange::parse(r))
            .collect::<Result<Vec<_>>>()?
    };

    let settings = resolve_settings(&mut config).await?;
    if !settings.has_login() {
        tracing::warn!("No login credentials configured; sign-in will fail");
    }

    let runner = Runner::new(&config);
    let mut stream = runner
        .run(settings, ranges, config.options.clone())
        .await?;

    let mut failure = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(record) => println!("{}", serde_json::to_string(&record)?),
            Err(e) => failure = Some(e),
        }
    }

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
