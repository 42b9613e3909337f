use anyhow::Context;
use clap::{Parser, Subcommand};
use parlor_auth::AuthError;
use parlor_config::load as load_config;
use parlor_gateway::{build_router, AppState};
use parlor_hub::{IdentityStore, User};
use parlor_runtime::{telemetry, ChatServices};
use sqlx::Row;
use tokio::net::TcpListener;
use tracing::info;

const SEED_USERS: [&str; 3] = ["alice", "bob", "carol"];
const SEED_PASSWORD: &str = "password123";
const SEED_ROOM: &str = "lobby";

#[derive(Parser)]
#[command(name = "parlor")]
#[command(about = "Parlor chat server (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server (default)
    Serve,
    /// Print rooms with their members and message counts
    DumpData,
    /// Delete all rooms, memberships and messages
    ClearData,
    /// Create demo users sharing one room
    SeedData,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::DumpData => dump_data().await,
        Commands::ClearData => clear_data().await,
        Commands::SeedData => seed_data().await,
    }
}

async fn initialise() -> anyhow::Result<(parlor_config::AppConfig, ChatServices)> {
    let config = load_config().context("failed to load configuration")?;

    let services = ChatServices::initialise(&config)
        .await
        .context("failed to initialise chat services")?;

    Ok((config, services))
}

async fn run_server() -> anyhow::Result<()> {
    info!("starting parlor chat server");

    let (config, services) = initialise().await?;

    let state = AppState::new(
        services.hub.clone(),
        services.authenticator.clone(),
        services.stores.clone(),
    );
    let app = build_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(parlor_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    services.hub.shutdown().await;
    services.db_pool.close().await;

    info!("server shut down");
    Ok(())
}

async fn dump_data() -> anyhow::Result<()> {
    let (_, services) = initialise().await?;

    let rooms = sqlx::query(
        r#"
        SELECT r.id, r.name, r.created_at,
               (SELECT COUNT(*) FROM room_users ru WHERE ru.room_id = r.id) AS member_count,
               (SELECT COUNT(*) FROM messages m WHERE m.room_id = r.id) AS message_count
        FROM rooms r
        ORDER BY r.id ASC
        "#,
    )
    .fetch_all(&services.db_pool)
    .await
    .context("failed to fetch rooms")?;

    println!("=== ROOMS ===");
    if rooms.is_empty() {
        println!("No rooms found in database");
    } else {
        println!("Found {} rooms:", rooms.len());
        println!(
            "{:<5} {:<30} {:<10} {:<10} {:<35}",
            "ID", "Name", "Members", "Messages", "Created At"
        );
        println!("{}", "-".repeat(90));

        for room in &rooms {
            let id: i64 = room.get("id");
            let name: String = room.get("name");
            let member_count: i64 = room.get("member_count");
            let message_count: i64 = room.get("message_count");
            let created_at: String = room.get("created_at");

            println!(
                "{:<5} {:<30} {:<10} {:<10} {:<35}",
                id, name, member_count, message_count, created_at
            );
        }
    }

    println!("\n=== MEMBERS ===");
    let members = sqlx::query(
        r#"
        SELECT ru.room_id, u.id AS user_id, u.username, ru.joined_at
        FROM room_users ru
        JOIN users u ON u.id = ru.user_id
        ORDER BY ru.room_id ASC, u.username ASC
        "#,
    )
    .fetch_all(&services.db_pool)
    .await
    .context("failed to fetch room members")?;

    if members.is_empty() {
        println!("No room members found in database");
    } else {
        println!(
            "{:<10} {:<10} {:<32} {:<35}",
            "Room ID", "User ID", "Username", "Joined At"
        );
        println!("{}", "-".repeat(90));

        for member in members {
            let room_id: i64 = member.get("room_id");
            let user_id: i64 = member.get("user_id");
            let username: String = member.get("username");
            let joined_at: String = member.get("joined_at");

            println!(
                "{:<10} {:<10} {:<32} {:<35}",
                room_id, user_id, username, joined_at
            );
        }
    }

    services.hub.shutdown().await;
    Ok(())
}

async fn clear_data() -> anyhow::Result<()> {
    let (_, services) = initialise().await?;
    services.hub.shutdown().await;

    let mut tx = services.db_pool.begin().await?;
    let messages_deleted = sqlx::query("DELETE FROM messages")
        .execute(&mut *tx)
        .await
        .context("failed to delete messages")?;
    let members_deleted = sqlx::query("DELETE FROM room_users")
        .execute(&mut *tx)
        .await
        .context("failed to delete memberships")?;
    let rooms_deleted = sqlx::query("DELETE FROM rooms")
        .execute(&mut *tx)
        .await
        .context("failed to delete rooms")?;
    tx.commit().await?;

    println!("Database cleared:");
    println!("- {} messages deleted", messages_deleted.rows_affected());
    println!("- {} memberships deleted", members_deleted.rows_affected());
    println!("- {} rooms deleted", rooms_deleted.rows_affected());
    Ok(())
}

async fn seed_data() -> anyhow::Result<()> {
    let (_, services) = initialise().await?;

    let mut users = Vec::new();
    for username in SEED_USERS {
        users.push(seed_user(&services, username).await?);
    }

    let existing = services
        .stores
        .rooms
        .list_rooms()
        .await?
        .into_iter()
        .find(|room| room.name == SEED_ROOM);
    let room = match existing {
        Some(room) => room,
        None => services.stores.rooms.create_room(SEED_ROOM).await?,
    };

    for user in &users {
        services.stores.memberships.join_room(user.id, room.id).await?;
    }

    services.hub.shutdown().await;

    println!("Database seeded with test data:");
    println!(
        "- users {} (password '{SEED_PASSWORD}')",
        SEED_USERS.join(", ")
    );
    println!("- room '{}' (id {}) shared by all of them", room.name, room.id);
    println!("Run 'dump-data' to see the inserted data");
    Ok(())
}

async fn seed_user(services: &ChatServices, username: &str) -> anyhow::Result<User> {
    match services.authenticator.register(username, SEED_PASSWORD).await {
        Ok(user) => Ok(user),
        Err(AuthError::UserExists) => Ok(services.users.find_user_by_username(username).await?),
        Err(error) => Err(error.into()),
    }
}
