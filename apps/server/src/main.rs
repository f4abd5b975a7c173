use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use parley_config::{load as load_config, AppConfig};
use parley_gateway::create_router_with_state;
use parley_runtime::{telemetry, BackendServices};
use sqlx::Row;
use tokio::net::TcpListener;
use tracing::info;

const INVITE_SWEEP_PERIOD: Duration = Duration::from_secs(60 * 60);

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley chat backend (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Delete invites that can no longer be accepted
    CleanupInvites,
    /// Print row counts per workspace
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::Migrate => migrate(config).await,
        Commands::CleanupInvites => cleanup_invites(config).await,
        Commands::Stats => stats(config).await,
    }
}

async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    info!("starting Parley backend");

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    let sweeper = services.spawn_invite_sweeper(INVITE_SWEEP_PERIOD);
    let app = create_router_with_state(services.state.clone());

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(parley_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    sweeper.abort();
    services.db_pool.close().await;
    info!("backend shut down");
    Ok(())
}

async fn migrate(config: AppConfig) -> anyhow::Result<()> {
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    services.db_pool.close().await;
    println!("Migrations applied to {}", config.database.url);
    Ok(())
}

async fn cleanup_invites(config: AppConfig) -> anyhow::Result<()> {
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    let removed = services.cleanup_expired_invites().await?;
    println!("Removed {removed} settled invites");
    Ok(())
}

async fn stats(config: AppConfig) -> anyhow::Result<()> {
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let rows = sqlx::query(
        r#"
        SELECT w.id, w.name,
               (SELECT COUNT(*) FROM workspace_members m
                 WHERE m.workspace_id = w.id AND m.active = 1) AS members,
               (SELECT COUNT(*) FROM rooms r
                 WHERE r.workspace_id = w.id AND r.status = 'active') AS rooms,
               (SELECT COUNT(*) FROM messages msg JOIN rooms r ON r.id = msg.room_id
                 WHERE r.workspace_id = w.id) AS messages,
               (SELECT COUNT(*) FROM workspace_invites i
                 WHERE i.workspace_id = w.id AND i.status = 'pending') AS invites
        FROM workspaces w
        WHERE w.active = 1
        ORDER BY w.created_at ASC
        "#,
    )
    .fetch_all(&services.db_pool)
    .await
    .context("failed to fetch workspace stats")?;

    if rows.is_empty() {
        println!("No workspaces found in database");
        return Ok(());
    }

    println!(
        "{:<26} {:<30} {:>8} {:>6} {:>9} {:>8}",
        "ID", "Name", "Members", "Rooms", "Messages", "Invites"
    );
    println!("{}", "-".repeat(92));
    for row in rows {
        let id: String = row.get("id");
        let name: String = row.get("name");
        let members: i64 = row.get("members");
        let rooms: i64 = row.get("rooms");
        let messages: i64 = row.get("messages");
        let invites: i64 = row.get("invites");
        println!("{id:<26} {name:<30} {members:>8} {rooms:>6} {messages:>9} {invites:>8}");
    }

    Ok(())
}
