//! `scene_server`
//!
//! Server-side systems:
//! - Fixed timestep scene simulation (props, capabilities, behaviors)
//! - Concurrency-guarded command queue drained once per tick
//! - Per-tick coarse spatial index and adjacent-cell collision pass
//! - Full-snapshot and delta replication batches
//! - TCP transport wiring the protocol to the scene

pub mod scene;
pub mod server;

pub use scene::Scene;
pub use server::GameServer;
