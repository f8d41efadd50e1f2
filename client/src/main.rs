use clap::Parser;
use client::game::ClientGameState;
use client::input::InputManager;
use client::network::{self, SharedState};
use client::rendering::Renderer;
use log::{error, info};
use macroquad::prelude::*;
use shared::DEFAULT_COORDINATOR_PORT;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pong player client", long_about = None)]
struct Args {
    /// Coordinator address to search for a match on
    #[arg(short, long, default_value_t = format!("127.0.0.1:{}", DEFAULT_COORDINATOR_PORT))]
    coordinator: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "450")]
    height: usize,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Pong".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let stream = match runtime.block_on(network::connect_coordinator(&args.coordinator)) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Could not reach coordinator at {}: {}", args.coordinator, e);
            std::process::exit(1);
        }
    };

    let state: SharedState = Arc::new(Mutex::new(ClientGameState::new()));
    let (direction_tx, direction_rx) = mpsc::unbounded_channel();

    {
        let state = Arc::clone(&state);
        runtime.spawn(async move {
            if let Err(e) = network::play(stream, Arc::clone(&state), direction_rx).await {
                error!("Network error: {}", e);
                network::lock(&state).disconnect(e.to_string());
            }
        });
    }

    info!("Controls: Up/Down (or W/S) to move, Escape to quit");

    let mut input_manager = InputManager::new();
    let mut renderer = Renderer::new(args.width, args.height);

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }

        if let Some(direction) = input_manager.update() {
            let _ = direction_tx.send(direction);
        }

        {
            let state = network::lock(&state);
            renderer.render(&state);
        }

        next_frame().await;
    }

    drop(direction_tx);
    runtime.shutdown_background();
}
