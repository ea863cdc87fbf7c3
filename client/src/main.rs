use clap::Parser;
use client::network::{Client, ClientOptions};
use client::orders::PlacementOrder;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Construction order `id@x,y,z`; may be repeated
    #[arg(short = 'p', long = "place")]
    orders: Vec<PlacementOrder>,

    /// Send orders even if the local preview rejects them
    #[arg(long)]
    no_preview: bool,

    /// Seconds to stay connected after the last order (runs until Ctrl-C if omitted)
    #[arg(long)]
    linger: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("{} construction orders queued", args.orders.len());

    let options = ClientOptions {
        fake_ping_ms: args.fake_ping,
        orders: args.orders,
        preview: !args.no_preview,
        linger: args.linger.map(Duration::from_secs),
        ..ClientOptions::default()
    };

    let mut client = Client::new(&args.server, options).await?;

    client.run().await?;

    Ok(())
}
