//! Driver-facing command line for the delivery route engine.
//!
//! Every invocation loads the session snapshot, applies one command, and
//! saves the snapshot back, so a route survives restarts and crashes
//! between commands.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lastmile_authority::{AuthorityClient, RetryPolicy};
use lastmile_engine::{DeliveryEngine, EngineSnapshot};

#[derive(Debug, Parser)]
#[command(name = "lastmile")]
#[command(about = "Capture delivery stops, compute a route, and walk it stop by stop")]
struct Cli {
    /// Base URL of the routing authority
    #[arg(long, env = "LASTMILE_AUTHORITY_URL")]
    authority_url: String,

    /// Bearer token for the routing authority
    #[arg(long, env = "LASTMILE_AUTHORITY_TOKEN")]
    authority_token: Option<String>,

    /// Path of the session snapshot file
    #[arg(long, env = "LASTMILE_STATE", default_value = "lastmile-state.json")]
    state: PathBuf,

    /// Request timeout in seconds
    #[arg(long, env = "LASTMILE_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Capture a delivery stop
    Capture {
        /// Street address as written on the package
        address: String,
        #[arg(long)]
        locality: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        postal_code: Option<String>,
        #[arg(long)]
        country: Option<String>,
        /// Latitude, when the address was picked on a map
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        /// Longitude, when the address was picked on a map
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
        #[arg(long)]
        floor: Option<String>,
        #[arg(long)]
        apartment: Option<String>,
        /// Packages for this stop
        #[arg(long, default_value = "1")]
        packages: u32,
    },
    /// Submit captured stops to the authority for normalization
    Submit,
    /// Compute the route from a fixed origin over the normalized stops
    Route {
        /// Origin latitude (e.g., the depot)
        #[arg(long, env = "LASTMILE_ORIGIN_LAT")]
        origin_lat: f64,
        /// Origin longitude
        #[arg(long, env = "LASTMILE_ORIGIN_LNG")]
        origin_lng: f64,
    },
    /// Start the route run and activate the first stop
    Start {
        #[arg(long, env = "LASTMILE_DRIVER_ID")]
        driver_id: i64,
    },
    /// Show every stop and where the walk stands
    Status,
    /// Inspect one stop of the run without touching the walk
    Show {
        /// Stop id as printed by `status`
        stop_id: uuid::Uuid,
    },
    /// Record the outcome of the current stop
    Deliver {
        /// Record a failed attempt instead of a completed delivery
        #[arg(long)]
        failed: bool,
        /// Free-form note (recipient, reason for failure)
        #[arg(long)]
        note: Option<String>,
        /// Current latitude, when GPS is available
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        /// Current longitude
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },
    /// Re-admit the first failed stop for another attempt
    Retry,
    /// Print the completion summary of the finished run
    Summary,
    /// Archive the finished run and make the session routable again
    Close,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let client = AuthorityClient::new(
        &cli.authority_url,
        cli.authority_token.as_deref(),
        cli.timeout_secs,
        RetryPolicy::default(),
    )?;
    let mut engine = match EngineSnapshot::load(&cli.state) {
        Ok(snapshot) => DeliveryEngine::restore(client, snapshot),
        Err(err) => {
            tracing::debug!(path = %cli.state.display(), error = %err, "no usable snapshot; starting fresh");
            DeliveryEngine::new(client)
        }
    };

    match cli.command {
        Commands::Capture {
            address,
            locality,
            region,
            postal_code,
            country,
            lat,
            lng,
            floor,
            apartment,
            packages,
        } => commands::run_capture(
            &mut engine,
            commands::CaptureArgs {
                address,
                locality,
                region,
                postal_code,
                country,
                lat,
                lng,
                floor,
                apartment,
                packages,
            },
        ),
        Commands::Submit => commands::run_submit(&mut engine).await?,
        Commands::Route {
            origin_lat,
            origin_lng,
        } => commands::run_route(&mut engine, origin_lat, origin_lng).await?,
        Commands::Start { driver_id } => commands::run_start(&mut engine, driver_id).await?,
        Commands::Status => commands::run_status(&engine),
        Commands::Show { stop_id } => commands::run_show(&engine, stop_id)?,
        Commands::Deliver {
            failed,
            note,
            lat,
            lng,
        } => commands::run_deliver(&mut engine, failed, note, lat.zip(lng)).await?,
        Commands::Retry => commands::run_retry(&mut engine)?,
        Commands::Summary => commands::run_summary(&engine)?,
        Commands::Close => commands::run_close(&mut engine)?,
    }

    engine.snapshot().save(&cli.state)?;
    Ok(())
}
