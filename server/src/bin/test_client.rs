//! Scripted client for exercising a running server from the command line
//!
//! Joins (or requests an AI match), keeps the session alive with heartbeats,
//! steers with random legal turns and asks for a rematch after every game
//! over. Everything the server sends is logged.

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use shared::{CountdownValue, Direction, Packet, Phase, Slot, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name to join with
    #[arg(short, long, default_value = "tester")]
    name: String,

    /// Play against the server's AI instead of waiting for a human
    #[arg(long)]
    ai: bool,

    /// Stop after this many seconds
    #[arg(short, long, default_value = "60")]
    duration: u64,

    /// Milliseconds between random turns
    #[arg(long, default_value = "400")]
    turn_ms: u64,
}

async fn send(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&serialize(packet)?, addr).await?;
    Ok(())
}

/// A heading that is neither the current one nor its reverse
fn random_turn(current: Direction) -> Direction {
    let turns: Vec<Direction> = Direction::ALL
        .into_iter()
        .filter(|direction| *direction != current && !direction.is_opposite(current))
        .collect();
    turns
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(current)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server_addr = args.server.parse::<SocketAddr>()?;
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);

    let join = if args.ai {
        Packet::RequestAiMatch {
            name: args.name.clone(),
        }
    } else {
        Packet::Join {
            name: args.name.clone(),
        }
    };
    info!("Sending {:?} to {}", join, server_addr);
    send(&socket, &join, server_addr).await?;

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut heartbeat = interval(Duration::from_secs(1));
    let mut turns = interval(Duration::from_millis(args.turn_ms));
    let deadline = Instant::now() + Duration::from_secs(args.duration);

    let mut slot: Option<Slot> = None;
    let mut heading = Direction::Right;
    let mut running = false;

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                let packet = match deserialize::<Packet>(&buf[..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Failed to deserialize packet: {}", e);
                        continue;
                    }
                };

                match packet {
                    Packet::Joined { slot: assigned } => {
                        info!("Joined as slot {}", assigned.number());
                        slot = Some(assigned);
                    }
                    Packet::Rejected { reason } => {
                        warn!("Rejected: {}", reason);
                        break;
                    }
                    Packet::MatchState(snapshot) => {
                        running = snapshot.phase == Phase::Running;
                        if let Some(board) = slot.and_then(|slot| snapshot.board(slot)) {
                            heading = board.direction;
                            debug!(
                                "Tick {}: length {}, score {}, debuffs {}",
                                snapshot.tick,
                                board.snake.len(),
                                board.score,
                                board.debuffs.len()
                            );
                        }
                    }
                    Packet::CountdownTick { value: Some(CountdownValue::Number(n)) } => {
                        info!("{}...", n)
                    }
                    Packet::CountdownTick { value: Some(CountdownValue::Go) } => info!("GO!"),
                    Packet::CountdownTick { value: None } => {}
                    Packet::MatchOver(result) => {
                        running = false;
                        info!(
                            "Match over: winner slot {} ({:?})",
                            result.winner_slot(),
                            result.reason
                        );
                        send(&socket, &Packet::RequestRestart, server_addr).await?;
                    }
                    other => info!("Received {:?}", other),
                }
            },

            _ = heartbeat.tick() => {
                send(&socket, &Packet::Heartbeat, server_addr).await?;
            },

            _ = turns.tick(), if running => {
                let direction = random_turn(heading);
                debug!("Turning {:?}", direction);
                send(&socket, &Packet::ChangeDirection { direction }, server_addr).await?;
            },

            _ = tokio::time::sleep_until(deadline) => {
                info!("Test duration elapsed");
                break;
            },
        }
    }

    send(&socket, &Packet::Disconnect, server_addr).await?;
    info!("Test client finished");

    Ok(())
}
