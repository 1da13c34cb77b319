pub mod atlas;
pub mod classify;
pub mod config;
pub mod data;
pub mod legend;
pub mod render;
pub mod server;
pub mod state;
pub mod tooltip;
pub mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the datasets and write choropleth GeoJSON, legends and tiles
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the joined data and rendered tiles
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print one country's classification and tooltip
    Country {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Country code as used by the boundary dataset, e.g. AFG
        code: String,
        /// Mode to classify in; defaults to the first configured mode
        #[arg(short, long)]
        mode: Option<types::Mode>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("covid_atlas=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        tracing::error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Generate { config } => {
            tracing::info!("Generating map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;

            // 1. Load Data
            let datasets = data::load_data(&app_config).await?;

            // 2. Join
            let atlas = atlas::Atlas::new(datasets);

            // 3. Render every mode in the toggle cycle
            for &mode in &app_config.display.modes {
                render::write_choropleth(&app_config, &atlas, mode)?;
                render::generate_tiles(&app_config, &atlas, mode)?;
            }

            tracing::info!("Generation complete!");
        }
        Commands::Serve { config } => {
            tracing::info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;

            let datasets = data::load_data(&app_config).await?;
            let atlas = atlas::Atlas::new(datasets);

            server::start_server(app_config, atlas).await?;
        }
        Commands::Country { config, code, mode, json } => {
            let app_config = config::AppConfig::load_from_file(&config)?;
            let mode = mode.unwrap_or(app_config.display.modes[0]);

            let datasets = data::load_data(&app_config).await?;
            let atlas = atlas::Atlas::new(datasets);

            let country = atlas
                .country(&code)
                .with_context(|| format!("No boundary for country code '{}'", code))?;
            let report = atlas.report(mode, country);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{} [{}] {} -> {}", report.code, mode, report.class, report.fill.unwrap_or("default"));
                println!("{}", report.tooltip.to_text());
            }
        }
    }

    Ok(())
}
