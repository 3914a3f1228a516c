//! Name-keyed prop factory.
//!
//! Maps prop type names to constructors. Built once when the scene is
//! created and read-only thereafter; an unknown name is a logged no-op,
//! never an error.

use std::collections::HashMap;

use tracing::warn;

use scene_shared::net::ClientId;
use scene_shared::prop::Prop;

use super::props;

/// Context handed to prop constructors.
pub struct SpawnCtx {
    /// Owning client, for controlled spawns.
    pub owner: Option<ClientId>,
}

type PropCtor = Box<dyn Fn(&SpawnCtx) -> Prop + Send + Sync>;

/// Read-only table of prop constructors.
pub struct PropRegistry {
    ctors: HashMap<String, PropCtor>,
}

impl PropRegistry {
    /// An empty registry, for scenes that register everything themselves.
    pub fn empty() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// The built-in prop types.
    pub fn with_builtins() -> Self {
        Self::empty()
            .register("player", props::player)
            .register("crate", props::crate_block)
    }

    /// Adds a constructor, replacing any previous one under the same name.
    pub fn register(
        mut self,
        name: impl Into<String>,
        ctor: impl Fn(&SpawnCtx) -> Prop + Send + Sync + 'static,
    ) -> Self {
        self.ctors.insert(name.into(), Box::new(ctor));
        self
    }

    /// Constructs a prop by type name. Unknown names are logged and yield
    /// nothing.
    pub fn construct(&self, name: &str, ctx: &SpawnCtx) -> Option<Prop> {
        match self.ctors.get(name) {
            Some(ctor) => Some(ctor(ctx)),
            None => {
                warn!(prop = %name, "spawn requested for unknown prop type");
                None
            }
        }
    }
}

impl Default for PropRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
