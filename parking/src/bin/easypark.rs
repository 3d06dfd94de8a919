//! `easypark` - maintenance CLI over the file-backed store.
//!
//! Runs a booking walkthrough and the bulk data operations (export, import,
//! clear, stats) against the directory named by `EASYPARK_DATA_DIR`.

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use easypark::{BookingRequest, Config, LotId, ParkingApp, Snapshot};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// EasyPark data tool.
#[derive(Parser, Debug)]
#[command(name = "easypark", about = "EasyPark parking-reservation data tool")]
struct Cli {
    /// Data directory (overrides EASYPARK_DATA_DIR).
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Book, validate and complete a stay with the demo account.
    Demo {
        /// Lot to book.
        #[arg(long, default_value_t = 1)]
        lot: u32,
        /// Plate to book with.
        #[arg(long, default_value = "ABC123")]
        plate: String,
    },

    /// Write every collection and counter as JSON.
    Export {
        /// Output file (stdout when omitted).
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },

    /// Restore collections and counters from an exported file.
    Import {
        /// Snapshot file.
        file: PathBuf,
    },

    /// Remove every stored key; later reads serve the seed data.
    Clear,

    /// Show record counts per collection.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let mut config = Config::from_env();

    tracing_subscriber::registry()
        .with(config.log_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    let app = ParkingApp::open(config).context("failed to open the data directory")?;

    match cli.command {
        Commands::Demo { lot, plate } => demo(&app, LotId::new(lot), plate).await?,
        Commands::Export { out } => {
            let json = app.data().export().await.to_json()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), "Snapshot written");
                }
                None => println!("{json}"),
            }
        }
        Commands::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let snapshot = Snapshot::from_json(&json).context("not a snapshot document")?;
            app.data().import(&snapshot).await?;
            println!("Imported {}", file.display());
        }
        Commands::Clear => {
            app.data().clear().await?;
            println!("All EasyPark data cleared");
        }
        Commands::Stats => {
            let stats = app.data().stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

async fn demo(app: &ParkingApp, lot_id: LotId, plate: String) -> anyhow::Result<()> {
    let login = app
        .login("demo@easyparking.com", "Demo123!")
        .await
        .context("demo account unavailable")?;
    println!("Logged in as {} ({})", login.account.name, login.account.email);

    let starts_at = (Utc::now() + Duration::hours(1)).naive_utc();
    let booked = app
        .create_reservation(BookingRequest {
            account_id: login.account.id.clone(),
            lot_id,
            starts_at,
            duration_minutes: 120,
            plate,
        })
        .await?;
    println!("Booked reservation {} with code {}", booked.id, booked.code);

    let confirmed = app.validate_reservation(booked.code.as_str()).await?;
    if let Some(space) = &confirmed.assigned_space {
        println!("Validated, assigned space {space}");
    }

    match app.estimate_cost(confirmed.id).await? {
        Some(cost) => println!("Estimated cost: {cost}"),
        None => println!("Lot has no tariff"),
    }

    let completed = app.complete_reservation(confirmed.id).await?;
    println!("Reservation {} is {}", completed.id, completed.status);

    let stats = app.lot_statistics(lot_id).await?;
    println!(
        "{}: {}/{} free ({}% occupied)",
        stats.name, stats.available, stats.total, stats.occupancy_percent
    );

    app.logout(&login.session.token).await;
    Ok(())
}
