//! Client library: connects to a scene server, mirrors replicated state, and
//! forwards input actions.

pub mod client;
pub mod world;

pub use client::GameClient;
pub use world::WorldView;
