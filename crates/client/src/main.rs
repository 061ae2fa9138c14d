mod app;
pub mod net;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;

use gridclaim::{DEFAULT_PORT, DEFAULT_TICK_RATE};

use app::App;
use net::{Autopilot, ClientConfig, GameClient};

#[derive(Parser)]
#[command(name = "gridclaim")]
#[command(about = "Headless gridclaim client")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1",
        help = "Server address, optionally with a port (e.g. 127.0.0.1:27016)"
    )]
    server: String,

    #[arg(short, long, default_value = "player")]
    name: String,

    #[arg(short, long, help = "Room code to join; a new room is created if omitted")]
    room: Option<String>,

    #[arg(long, help = "File used to remember the room for reconnecting")]
    session_file: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = 60)]
    frame_rate: u32,

    #[arg(long, default_value_t = 8, help = "Ticks per side of the autopilot loop")]
    leg_ticks: u32,

    #[arg(long, help = "Exit after this many seconds")]
    run_secs: Option<f32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let (host, port) = split_server_addr(&args.server)?;

    let config = ClientConfig {
        player_name: args.name,
        room_code: args.room,
        tick_rate: args.tick_rate,
        session_file: args.session_file,
        ..Default::default()
    };

    let mut client = GameClient::new(config);
    client
        .connect(&host, port)
        .with_context(|| format!("Failed to connect to {}:{}", host, port))?;

    let run_for = args
        .run_secs
        .filter(|secs| *secs > 0.0)
        .map(Duration::from_secs_f32);
    let mut app = App::new(client, Autopilot::new(args.leg_ticks), args.frame_rate, run_for);
    app.run();

    Ok(())
}

fn split_server_addr(addr: &str) -> Result<(String, u16)> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        return Ok((socket_addr.ip().to_string(), socket_addr.port()));
    }
    if addr.parse::<IpAddr>().is_ok() {
        return Ok((addr.to_string(), DEFAULT_PORT));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .with_context(|| format!("Invalid port in {}", addr))?;
            Ok((host.to_string(), port))
        }
        None => Ok((addr.to_string(), DEFAULT_PORT)),
    }
}
