//! Full socket-based integration tests for client/server communication.

use std::time::Duration;

use scene_client::GameClient;
use scene_server::server::bind_ephemeral;
use scene_shared::net::{ActionCode, ActionStatus};

/// Connect a client, receive the player spawn, walk right, verify movement
/// replicates.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_connects_and_moves() -> anyhow::Result<()> {
    scene_tests::init_test_logging();

    let (mut server, cfg) = bind_ephemeral(64).await?;

    let server_handle = tokio::spawn(async move {
        loop {
            let _ = server.try_accept(Duration::from_millis(2)).await;
            if server.step().is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let mut client = GameClient::connect(&cfg, "Bob").await?;

    // wait for the player spawn to replicate
    let mut seen = false;
    for _ in 0..100 {
        client.poll_update(Duration::from_millis(50)).await?;
        if !client.world().is_empty() {
            seen = true;
            break;
        }
    }
    assert!(seen, "expected the spawned player to replicate");

    let (id, start_x) = client
        .world()
        .iter()
        .next()
        .map(|(id, snap)| (id.clone(), snap.positioned.pos_x))
        .expect("one replicated prop");

    client
        .send_input(ActionCode::Right, ActionStatus::Pressed)
        .await?;

    let mut moved = false;
    for _ in 0..100 {
        client.poll_update(Duration::from_millis(50)).await?;
        if let Some(snap) = client.world().get(&id) {
            if snap.positioned.pos_x > start_x {
                moved = true;
                break;
            }
        }
    }
    assert!(moved, "expected movement to replicate");

    client
        .send_input(ActionCode::Right, ActionStatus::Released)
        .await?;
    client.disconnect().await?;
    server_handle.abort();
    Ok(())
}

/// A client connecting to a populated scene is primed with a full snapshot.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_joiner_receives_full_snapshot() -> anyhow::Result<()> {
    scene_tests::init_test_logging();

    let (mut server, cfg) = bind_ephemeral(64).await?;

    let server_handle = tokio::spawn(async move {
        loop {
            let _ = server.try_accept(Duration::from_millis(2)).await;
            if server.step().is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let mut first = GameClient::connect(&cfg, "Bob").await?;
    for _ in 0..100 {
        first.poll_update(Duration::from_millis(50)).await?;
        if !first.world().is_empty() {
            break;
        }
    }
    assert!(!first.world().is_empty(), "first player never replicated");

    let mut second = GameClient::connect(&cfg, "Eve").await?;
    let mut primed = false;
    for _ in 0..100 {
        second.poll_update(Duration::from_millis(50)).await?;
        if !second.world().is_empty() {
            primed = true;
            break;
        }
    }
    assert!(primed, "late joiner expected a priming snapshot");

    // eventually both players are visible to the late joiner
    let mut both = false;
    for _ in 0..100 {
        second.poll_update(Duration::from_millis(50)).await?;
        if second.world().len() >= 2 {
            both = true;
            break;
        }
    }
    assert!(both, "late joiner expected to see both players");

    server_handle.abort();
    Ok(())
}
