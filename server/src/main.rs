use clap::Parser;
use log::info;
use server::config::MatchConfig;
use server::network::Server;
use server::score::{FileScoreSink, LogScoreSink, ScoreSink};
use shared::{Grid, COUNTDOWN_INTERVAL_MS, GRID_SIZE, TICK_RATE_MS};
use std::path::PathBuf;
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

    /// Milliseconds between movement ticks
    #[arg(short, long, default_value_t = TICK_RATE_MS)]
    tick_ms: u64,

    /// Width and height of each board in cells
    #[arg(short, long, default_value_t = GRID_SIZE)]
    grid_size: i32,

    /// Milliseconds between countdown announcements
    #[arg(long, default_value_t = COUNTDOWN_INTERVAL_MS)]
    countdown_ms: u64,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Append final scores to this file instead of only logging them
    #[arg(short, long)]
    scores: Option<PathBuf>,

    /// Fixed seed for food and debuff placement
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.grid_size < 4 {
        return Err(format!("grid size must be at least 4, got {}", args.grid_size).into());
    }
    if args.tick_ms == 0 || args.countdown_ms == 0 {
        return Err("timer periods must be non-zero".into());
    }

    let config = MatchConfig {
        grid: Grid::new(args.grid_size),
        tick_duration: Duration::from_millis(args.tick_ms),
        countdown_interval: Duration::from_millis(args.countdown_ms),
        seed: args.seed,
        ..MatchConfig::default()
    };

    let scores: Box<dyn ScoreSink> = match args.scores {
        Some(path) => {
            info!("Recording scores in {}", path.display());
            Box::new(FileScoreSink::new(path))
        }
        None => Box::new(LogScoreSink),
    };

    info!(
        "Starting server: {}x{} grid, {:.2} ticks per second, max {} clients",
        args.grid_size,
        args.grid_size,
        config.tick_rate_hz(),
        args.max_clients
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, args.max_clients, scores).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
