use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig, ServerMessage};
use server::session::SessionConfig;
use server::world::World;
use shared::catalog::default_catalog;
use shared::geometry::{Aabb, Vec3};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value = "8")]
    max_clients: usize,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Gold granted to every joining player
    #[arg(long, default_value_t = shared::STARTING_GOLD)]
    starting_gold: u32,

    /// Maximum distance from an owned building for new construction
    #[arg(long, default_value_t = shared::BUILDING_RANGE_LIMIT)]
    range_limit: f32,
}

/// A few rocks between the spawn points
fn default_terrain() -> World {
    let rock = |x: f32, z: f32| {
        Aabb::from_center_size(Vec3::new(x, 1.0, z), Vec3::new(3.0, 2.0, 3.0))
    };
    World::with_obstacles(vec![rock(20.0, 20.0), rock(60.0, 20.0), rock(20.0, -20.0)])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        tick_duration: Duration::from_secs_f64(1.0 / f64::from(args.tick_rate.max(1))),
        max_clients: args.max_clients,
        timeout: Duration::from_secs(args.timeout),
        session: SessionConfig {
            starting_gold: args.starting_gold,
            building_range_limit: args.range_limit,
            ..SessionConfig::default()
        },
    };

    let address = format!("{}:{}", args.host, args.port);
    info!("Starting server on {} at {}Hz", address, args.tick_rate);

    let mut server =
        Server::with_world(&address, config, default_catalog(), default_terrain()).await?;

    let control = server.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            if control.send(ServerMessage::Shutdown).is_err() {
                error!("Server loop already stopped");
            }
        }
    });

    server.run().await?;

    Ok(())
}
