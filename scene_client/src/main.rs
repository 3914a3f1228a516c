//! Demo client binary.
//!
//! Usage:
//!   cargo run -p scene_client -- [--addr 127.0.0.1:40000] [--name Bob]
//!
//! Connects, walks right for a second, then prints the replicated props.

use std::env;
use std::time::Duration;

use scene_shared::config::EngineConfig;
use scene_shared::net::{ActionCode, ActionStatus};
use tracing::info;

use scene_client::GameClient;

fn parse_args() -> (EngineConfig, String) {
    let mut cfg = EngineConfig::default();
    let mut name = "demo".to_string();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                name = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    (cfg, name)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (cfg, name) = parse_args();
    let mut client = GameClient::connect(&cfg, &name).await?;

    client
        .send_input(ActionCode::Right, ActionStatus::Pressed)
        .await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        client.poll_update(Duration::from_millis(50)).await?;
    }

    client
        .send_input(ActionCode::Right, ActionStatus::Released)
        .await?;

    for (id, snap) in client.world().iter() {
        info!(
            prop = %id,
            x = snap.positioned.pos_x,
            y = snap.positioned.pos_y,
            anim = %snap.drawable.animation_code,
            "replicated prop"
        );
    }

    client.disconnect().await?;
    Ok(())
}
