//! tandem - headless client for tandem sessions
//!
//! Joins a room and streams session events to stdout, either human-readable
//! or as JSON lines. Useful for smoke-testing a relay and as a wire tap
//! next to a real rendering client.

use std::time::Duration;

use clap::Parser;
use tracing::error;
use uuid::Uuid;

use tandem_client::{ClientConfig, CollabSession, SessionEvent};
use tandem_protocol::Color;
use tandem_utils::{LogConfig, Result};

#[derive(Parser, Debug)]
#[command(name = "tandem", about = "Join a tandem session and stream its events")]
struct Cli {
    /// Room to join
    #[arg(short, long, env = "TANDEM_ROOM")]
    room: String,

    /// User id (defaults to a generated one)
    #[arg(short, long, env = "TANDEM_USER")]
    user: Option<String>,

    /// Server address (unix://path or tcp://host:port)
    #[arg(short, long, env = "TANDEM_ADDR")]
    addr: Option<String>,

    /// Participant color as R,G,B
    #[arg(long, value_parser = parse_color, default_value = "128,128,128")]
    color: Color,

    /// Emit events as JSON lines instead of human-readable text
    #[arg(long)]
    json: bool,
}

fn parse_color(s: &str) -> std::result::Result<Color, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err("expected R,G,B".to_string());
    }
    let channel = |i: usize| {
        parts[i]
            .trim()
            .parse::<u8>()
            .map_err(|e| format!("bad channel '{}': {}", parts[i], e))
    };
    Ok(Color::new(channel(0)?, channel(1)?, channel(2)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    tandem_utils::init_logging_with_config(LogConfig::client())?;

    let cli = Cli::parse();

    let mut config = ClientConfig::load()?;
    if let Some(addr) = cli.addr {
        config.connect_addr = Some(addr);
    }
    config.validate()?;

    let user_id = cli
        .user
        .unwrap_or_else(|| format!("user-{}", &Uuid::new_v4().simple().to_string()[..8]));

    let mut session = CollabSession::new(config.transport());
    let users = session.connect(&cli.room, &user_id, cli.color).await?;

    println!(
        "joined room {} as {} ({} already present)",
        cli.room,
        user_id,
        users.len()
    );
    for user in &users {
        println!("  {} (joined at {})", user.user_id, user.joined_at);
    }

    let mut tick = tokio::time::interval(Duration::from_millis(16));
    'main: loop {
        tokio::select! {
            _ = tick.tick() => {
                for event in session.pump() {
                    print_event(&event, cli.json);
                    if matches!(event, SessionEvent::ConnectionLost) {
                        break 'main;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                session.leave();
                break;
            }
        }
    }

    session.disconnect().await;
    Ok(())
}

fn print_event(event: &SessionEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to encode event: {}", e),
        }
        return;
    }

    match event {
        SessionEvent::UserJoined { user_id, .. } => println!("+ {} joined", user_id),
        SessionEvent::UserLeft { user_id } => println!("- {} left", user_id),
        SessionEvent::RemoteTransform { user_id, transform } => println!(
            "~ {} head at ({:.2}, {:.2}, {:.2})",
            user_id, transform.head_pos.x, transform.head_pos.y, transform.head_pos.z
        ),
        SessionEvent::RemoteGesture { user_id, gesture } => println!(
            "~ {} gesture {:?}/{:?} swipe {:?}",
            user_id, gesture.left_hand, gesture.right_hand, gesture.swipe
        ),
        SessionEvent::TaskChanged { update } => println!(
            "* task {} -> {} @{}",
            update.task_id, update.column, update.position
        ),
        SessionEvent::NewComment {
            user_id,
            task_id,
            text,
            ..
        } => println!("# {} on {}: {}", user_id, task_id, text),
        SessionEvent::ConnectionLost => println!("! connection lost"),
    }
}
