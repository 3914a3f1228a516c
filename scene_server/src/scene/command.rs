//! Internal command queue.
//!
//! Client-facing actions enqueue commands from arbitrarily many concurrent
//! tasks; the tick drains them exactly once, in FIFO order. This is the only
//! scene structure touched from outside the tick.

use std::collections::VecDeque;
use std::sync::Mutex;

use scene_shared::net::{ActionCode, ActionStatus, ClientId};
use scene_shared::prop::{PropId, PropPatch};

/// Queued intent mutating scene state.
#[derive(Debug, Clone)]
pub enum Command {
    SpawnProp {
        name: String,
        overrides: PropPatch,
    },
    SpawnControlledProp {
        name: String,
        client_id: ClientId,
        name_tag: Option<String>,
    },
    DestroyProp {
        id: PropId,
    },
    DestroyControlledProp {
        client_id: ClientId,
    },
    ClientInput {
        client_id: ClientId,
        code: ActionCode,
        status: ActionStatus,
    },
}

/// Mutex-guarded FIFO of pending commands. Unbounded, no priority, no
/// expiry: an enqueued command is always eventually processed.
#[derive(Default)]
pub struct CommandQueue {
    inner: Mutex<VecDeque<Command>>,
}

impl CommandQueue {
    /// Appends a command to the tail.
    pub fn enqueue(&self, cmd: Command) {
        self.inner
            .lock()
            .expect("command queue lock poisoned")
            .push_back(cmd);
    }

    /// Removes and returns every pending command, in enqueue order,
    /// atomically with respect to concurrent `enqueue` calls.
    pub fn drain_all(&self) -> Vec<Command> {
        self.inner
            .lock()
            .expect("command queue lock poisoned")
            .drain(..)
            .collect()
    }
}
