//! Client connection handling.

use std::time::Duration;

use anyhow::Context;
use scene_shared::{
    config::EngineConfig,
    net::{ActionCode, ActionStatus, ClientAct, ClientId, ConnStatus, NetMsg, ReliableConn},
};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::world::WorldView;

/// A connected game client: handshake identity, the reliable channel, and the
/// replicated world it maintains.
pub struct GameClient {
    pub client_id: ClientId,
    pub name_tag: String,
    conn: ReliableConn,
    world: WorldView,
}

impl GameClient {
    /// Connects to the server and performs the handshake.
    pub async fn connect(cfg: &EngineConfig, client_name: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(&cfg.server_addr)
            .await
            .context("tcp connect")?;
        let mut conn = ReliableConn::new(stream);

        conn.send(&NetMsg::Conn {
            client_name: client_name.to_string(),
        })
        .await?;

        let res = conn.recv().await?;
        let NetMsg::ConnRes {
            status,
            cause,
            client_id,
            name_tag,
        } = res
        else {
            anyhow::bail!("unexpected handshake response: {res:?}");
        };

        match status {
            ConnStatus::Allowed => {}
            ConnStatus::Restricted => {
                anyhow::bail!(
                    "connection restricted: {}",
                    cause.unwrap_or_else(|| "no cause given".into())
                );
            }
        }
        let client_id = client_id.context("missing client id in handshake")?;
        let name_tag = name_tag.unwrap_or_else(|| client_name.to_string());

        info!(client_id = ?client_id, name_tag = %name_tag, "Connected to server");
        Ok(Self {
            client_id,
            name_tag,
            conn,
            world: WorldView::new(),
        })
    }

    /// Sends an input action to the server.
    pub async fn send_input(&mut self, code: ActionCode, status: ActionStatus) -> anyhow::Result<()> {
        self.conn
            .send(&NetMsg::ClientAct {
                client_id: self.client_id,
                data: ClientAct { code, status },
            })
            .await
    }

    /// Waits up to `timeout` for one server message and folds it into the
    /// world. Returns whether a scene batch was applied.
    pub async fn poll_update(&mut self, timeout: Duration) -> anyhow::Result<bool> {
        let msg = match tokio::time::timeout(timeout, self.conn.recv()).await {
            Ok(msg) => msg?,
            Err(_) => return Ok(false),
        };
        match msg {
            NetMsg::Scene { data, .. } => {
                self.world.apply(&data);
                Ok(true)
            }
            NetMsg::NotReg => {
                anyhow::bail!("server rejected input: not registered")
            }
            other => {
                debug!(?other, "ignoring server message");
                Ok(false)
            }
        }
    }

    /// The replicated world this client maintains.
    pub fn world(&self) -> &WorldView {
        &self.world
    }

    /// Announces a disconnect to the server.
    pub async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.conn
            .send(&NetMsg::Disc {
                client_id: self.client_id,
            })
            .await
    }
}
