//! Server implementation.
//!
//! An authoritative tick-based server:
//! - TCP connections with a `conn`/`connRes` handshake
//! - Per-connection reader/writer tasks bridged to the tick loop by channels
//! - Scene simulation stepped at a fixed timestep
//! - Full-snapshot priming for new clients, delta broadcast every tick
//! - Console commands (status, quit)
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Avoid wall-clock-dependent branching in gameplay code.
//! - Use stable ordering when iterating collections.

use anyhow::Context;
use scene_shared::{
    config::EngineConfig,
    net::{
        BatchTarget, ClientId, ConnStatus, NetMsg, OutboundBatch, ReliableConn, ReliableListener,
    },
    stage::Stage,
};
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info, warn};

use crate::scene::{registry::PropRegistry, Scene};

/// Connected client state.
struct ClientState {
    name_tag: String,
    outbound: mpsc::UnboundedSender<NetMsg>,
}

/// Game server: transport plus the scene it drives.
pub struct GameServer {
    pub cfg: EngineConfig,
    scene: Arc<Scene>,
    clients: HashMap<ClientId, ClientState>,

    listener: ReliableListener,

    /// Messages forwarded by per-connection reader tasks.
    inbound_tx: mpsc::UnboundedSender<(ClientId, NetMsg)>,
    inbound_rx: mpsc::UnboundedReceiver<(ClientId, NetMsg)>,
    /// Batches emitted by the scene subscriber.
    batch_rx: mpsc::UnboundedReceiver<(OutboundBatch, BatchTarget)>,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl GameServer {
    /// Creates a new server with the given config.
    pub async fn new(cfg: EngineConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        Self::with_listener(cfg, listener)
    }

    fn with_listener(cfg: EngineConfig, listener: ReliableListener) -> anyhow::Result<Self> {
        let stage = match &cfg.stage {
            Some(name) => {
                let path = Path::new(&cfg.stages_dir).join(format!("{name}.json"));
                let stage = Stage::load(&path)
                    .with_context(|| format!("load stage {}", path.display()))?;
                info!(stage = %stage.meta.name, grid_size = stage.meta.grid_size, "Stage loaded");
                Arc::new(stage)
            }
            None => Arc::new(Stage::empty()),
        };

        let scene = Arc::new(Scene::new(
            stage,
            PropRegistry::default(),
            cfg.player_prop.clone(),
        ));

        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        scene.subscribe(Box::new(move |batch, target| {
            let _ = batch_tx.send((batch.clone(), target));
        }));

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            cfg,
            scene,
            clients: HashMap::new(),
            listener,
            inbound_tx,
            inbound_rx,
            batch_rx,
            console_rx: None,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The scene this server drives.
    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    /// Accepts a client with timeout (non-blocking).
    pub async fn try_accept(&mut self, timeout: Duration) -> anyhow::Result<Option<ClientId>> {
        match tokio::time::timeout(timeout, self.listener.accept()).await {
            Ok(Ok((conn, peer))) => self.handle_new_connection(conn, peer).await.map(Some),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None), // Timeout
        }
    }

    async fn handle_new_connection(
        &mut self,
        mut conn: ReliableConn,
        peer: SocketAddr,
    ) -> anyhow::Result<ClientId> {
        let msg = conn.recv().await?;
        let client_name = match msg {
            NetMsg::Conn { client_name } => client_name,
            other => anyhow::bail!("unexpected handshake msg: {other:?}"),
        };

        let id = ClientId::new_unique();
        conn.send(&NetMsg::ConnRes {
            status: ConnStatus::Allowed,
            cause: None,
            client_id: Some(id),
            name_tag: Some(client_name.clone()),
        })
        .await?;

        let (mut reader, mut writer) = conn.into_split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<NetMsg>();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if writer.send(&msg).await.is_err() {
                    break;
                }
            }
        });

        let inbound = self.inbound_tx.clone();
        tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(msg) => {
                        if inbound.send((id, msg)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(client_id = ?id, error = %e, "client connection closed");
                        let _ = inbound.send((id, NetMsg::Disc { client_id: id }));
                        break;
                    }
                }
            }
        });

        self.clients.insert(
            id,
            ClientState {
                name_tag: client_name.clone(),
                outbound: out_tx,
            },
        );
        self.scene.connect_action(id, Some(client_name));

        info!(client_id = ?id, %peer, "Client connected");
        Ok(id)
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step()?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one fixed simulation step: console, inbound messages, scene
    /// tick, outbound batches.
    pub fn step(&mut self) -> anyhow::Result<()> {
        self.process_console_commands();
        self.drain_inbound();
        self.scene.tick();
        self.flush_batches();
        Ok(())
    }

    fn process_console_commands(&mut self) {
        // Collect lines first to avoid borrow conflict
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            for out in self.exec_console(&line) {
                println!("{out}");
            }
        }
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = tokens.first() else {
            return Vec::new();
        };

        match cmd {
            "status" => {
                let meta = self.scene.scene_meta();
                let mut out = Vec::new();
                out.push(format!("Stage: {} (grid {})", meta.stage_name, meta.grid_size));
                out.push(format!("Tick: {}", self.scene.tick_num()));
                out.push(format!("Props: {}", self.scene.prop_count()));
                out.push(format!("Clients: {}", self.clients.len()));
                for (id, client) in &self.clients {
                    out.push(format!("  {:?}: name={}", id, client.name_tag));
                }
                out
            }
            "quit" | "exit" => {
                info!("Server shutting down");
                std::process::exit(0);
            }
            _ => vec![format!("Unknown command: {cmd}")],
        }
    }

    fn drain_inbound(&mut self) {
        while let Ok((conn_id, msg)) = self.inbound_rx.try_recv() {
            match msg {
                NetMsg::ClientAct { client_id, data } => {
                    if client_id != conn_id || !self.clients.contains_key(&conn_id) {
                        warn!(claimed = ?client_id, actual = ?conn_id, "input with mismatched client id");
                        if let Some(c) = self.clients.get(&conn_id) {
                            let _ = c.outbound.send(NetMsg::NotReg);
                        }
                        continue;
                    }
                    self.scene.client_action(client_id, data.code, data.status);
                }
                NetMsg::Disc { client_id } => {
                    if self.clients.remove(&client_id).is_some() {
                        info!(client_id = ?client_id, "Client disconnected");
                        self.scene.disconnect_action(client_id);
                    }
                }
                other => {
                    debug!(?other, "Unexpected client message");
                }
            }
        }
    }

    fn flush_batches(&mut self) {
        while let Ok((batch, target)) = self.batch_rx.try_recv() {
            match target {
                BatchTarget::All => {
                    for (id, client) in &self.clients {
                        let _ = client.outbound.send(NetMsg::Scene {
                            client_id: *id,
                            data: batch.clone(),
                        });
                    }
                }
                BatchTarget::Client(id) => {
                    if let Some(client) = self.clients.get(&id) {
                        let _ = client.outbound.send(NetMsg::Scene {
                            client_id: id,
                            data: batch.clone(),
                        });
                    }
                }
            }
        }
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, EngineConfig)> {
    let cfg = EngineConfig {
        server_addr: format!("{}:0", IpAddr::V4(Ipv4Addr::LOCALHOST)),
        tick_hz,
        ..Default::default()
    };

    let listener = ReliableListener::bind(cfg.server_addr.parse()?).await?;
    let addr = listener.local_addr()?;
    let mut cfg = cfg;
    cfg.server_addr = addr.to_string();

    let server = GameServer::with_listener(cfg.clone(), listener)?;
    Ok((server, cfg))
}
