use clap::Parser;
use log::{info, warn};
use server::network::Server;
use server::session::SessionConfig;
use shared::{DEFAULT_SERVER_PORT, SECRET_ENV};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative pong match server", long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    /// Shared secret the coordinator must present when preparing a match
    #[arg(short, long, env = SECRET_ENV, hide_env_values = true)]
    secret: Option<String>,

    /// Physics updates per second
    #[arg(short, long, default_value = "128")]
    tick_rate: u32,

    /// Score that ends the match (0 plays forever)
    #[arg(long, default_value = "11")]
    max_score: u32,

    /// Seconds without input before a player counts as gone (0 waits forever)
    #[arg(long, default_value = "10")]
    idle_timeout: u64,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let secret = args.secret.filter(|secret| !secret.is_empty());
    if secret.is_none() {
        warn!(
            "No secret set via --secret or {} - preparation requests will not be authenticated",
            SECRET_ENV
        );
    }

    let config = SessionConfig {
        secret,
        max_score: (args.max_score > 0).then_some(args.max_score),
        idle_timeout: (args.idle_timeout > 0).then(|| Duration::from_secs(args.idle_timeout)),
    };
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64);

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, tick_duration).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
