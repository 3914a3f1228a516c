//! `scene_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Capability presence, not type identity, decides subsystem participation.
//! - Wire types serialize to the exact JSON shape clients consume.
//! - Deterministic where practical; no `unsafe`.

pub mod config;
pub mod net;
pub mod prop;
pub mod stage;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::net::*;
    pub use crate::prop::*;
    pub use crate::stage::*;
}
