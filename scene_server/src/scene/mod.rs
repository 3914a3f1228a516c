//! Scene orchestrator.
//!
//! Owns the canonical prop list and advances it on a fixed tick:
//! 1. rebuild the spatial index from current positions,
//! 2. run per-prop tick hooks,
//! 3. drain and apply queued commands (spawns patch the current index so
//!    they are visible to this tick's collision pass),
//! 4. run the collision pass,
//! 5. emit a delta batch to subscribers if the tick produced anything,
//! 6. advance the tick counter.
//!
//! Concurrency model: the tick is invoked by an external scheduler and is
//! the single writer of the prop list. Client-facing action methods may be
//! called from arbitrarily many tasks; they only touch the command queue,
//! except `connect_action`, which takes a short read pass over the state for
//! the priming snapshot. Overlapping `tick()` calls are dropped, not queued.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};

use scene_shared::net::{ActionCode, ActionStatus, BatchTarget, ClientId, OutboundBatch};
use scene_shared::prop::{
    DrawablePatch, NameTagged, PositionedPatch, Prop, PropBehavior, PropCaps, PropId, PropPatch,
    TickCtx,
};
use scene_shared::stage::Stage;

pub mod chunks;
pub mod collision;
pub mod command;
pub mod props;
pub mod registry;

use chunks::{cell_of, ChunkMap};
use command::{Command, CommandQueue};
use registry::{PropRegistry, SpawnCtx};

/// Handler receiving outbound batches, invoked once per tick (delta,
/// broadcast) and once per new connection (full snapshot, targeted).
pub type BatchHandler = Box<dyn Fn(&OutboundBatch, BatchTarget) + Send + Sync>;

/// Stage summary exposed to diagnostics and clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMeta {
    pub stage_name: String,
    pub grid_size: u32,
}

/// State the tick owns. `connect_action` takes short read passes; nothing
/// else outside the tick touches it.
struct SceneState {
    props: VecDeque<Prop>,
    chunks: ChunkMap,
    tick_num: u64,
}

/// The authoritative scene.
pub struct Scene {
    state: Mutex<SceneState>,
    queue: CommandQueue,
    registry: PropRegistry,
    stage: Arc<Stage>,
    player_prop: String,
    running: AtomicBool,
    subscriber: Mutex<Option<BatchHandler>>,
}

/// Clears the running flag on every exit path, panicking hooks included.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scene {
    pub fn new(stage: Arc<Stage>, registry: PropRegistry, player_prop: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(SceneState {
                props: VecDeque::new(),
                chunks: ChunkMap::default(),
                tick_num: 0,
            }),
            queue: CommandQueue::default(),
            registry,
            stage,
            player_prop: player_prop.into(),
            running: AtomicBool::new(false),
            subscriber: Mutex::new(None),
        }
    }

    /// Registers the single outbound batch handler.
    pub fn subscribe(&self, handler: BatchHandler) {
        *self.subscriber.lock().expect("subscriber lock poisoned") = Some(handler);
    }

    /// Seeds the prop list from a precomputed template.
    pub fn load_template(&self, props: Vec<Prop>) {
        let mut st = self.state.lock().expect("scene state lock poisoned");
        st.props = props.into();
    }

    pub fn scene_meta(&self) -> SceneMeta {
        SceneMeta {
            stage_name: self.stage.meta.name.clone(),
            grid_size: self.stage.meta.grid_size,
        }
    }

    pub fn tick_num(&self) -> u64 {
        self.state.lock().expect("scene state lock poisoned").tick_num
    }

    pub fn prop_count(&self) -> usize {
        self.state
            .lock()
            .expect("scene state lock poisoned")
            .props
            .len()
    }

    /// Read access to the live prop list, for diagnostics and tests.
    pub fn with_props<R>(&self, f: impl FnOnce(&VecDeque<Prop>) -> R) -> R {
        let st = self.state.lock().expect("scene state lock poisoned");
        f(&st.props)
    }

    /// Advances one tick. A call that arrives while a tick is still running
    /// is dropped, never queued.
    pub fn tick(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("tick dropped: previous tick still running");
            return;
        }
        let _running = RunningGuard(&self.running);

        let mut guard = self.state.lock().expect("scene state lock poisoned");
        let st = &mut *guard;

        // 1. rebuild the index from positions as of the start of this tick
        st.chunks.clear();
        for prop in &st.props {
            if let Some(pos) = prop.caps.positioned {
                st.chunks.file_prop(cell_of(&pos), prop.id.clone());
            }
        }

        // 2. per-prop tick hooks
        {
            let SceneState {
                props,
                chunks,
                tick_num,
            } = st;
            let ctx = TickCtx {
                tick: *tick_num,
                stage: &self.stage,
            };
            for prop in props.iter_mut() {
                dispatch_hook(chunks, prop, |b, caps| b.on_tick(caps, &ctx));
            }
        }

        // 3. drain and apply queued commands
        for cmd in self.queue.drain_all() {
            self.apply_command(st, cmd);
        }

        // 4. collision pass over the (possibly spawn-augmented) index
        let pairs = collision::find_pairs(&st.chunks, &st.props);
        for (a_id, b_id) in pairs {
            Self::dispatch_collision(st, &a_id, &b_id);
        }

        // 5-6. delta batch and tick counter
        let batch = st.chunks.delta_batch(&st.props);
        st.tick_num += 1;
        drop(guard);

        if let Some(batch) = batch {
            self.emit(&batch, BatchTarget::All);
        }
    }

    // client-facing actions

    /// Enqueues the controlled spawn for a connecting client, then primes
    /// that client with a full snapshot of the world as of the last
    /// completed tick.
    pub fn connect_action(&self, client_id: ClientId, name_tag: Option<String>) {
        info!(client_id = ?client_id, "scene connected client");
        self.queue.enqueue(Command::SpawnControlledProp {
            name: self.player_prop.clone(),
            client_id,
            name_tag,
        });

        let full = {
            let st = self.state.lock().expect("scene state lock poisoned");
            st.chunks.full_batch(&st.props)
        };
        if let Some(batch) = full {
            self.emit(&batch, BatchTarget::Client(client_id));
        }
    }

    pub fn disconnect_action(&self, client_id: ClientId) {
        self.queue
            .enqueue(Command::DestroyControlledProp { client_id });
    }

    pub fn client_action(&self, client_id: ClientId, code: ActionCode, status: ActionStatus) {
        self.queue.enqueue(Command::ClientInput {
            client_id,
            code,
            status,
        });
    }

    // server-side/game-logic entry points

    pub fn spawn_prop_action(&self, name: impl Into<String>, overrides: PropPatch) {
        self.queue.enqueue(Command::SpawnProp {
            name: name.into(),
            overrides,
        });
    }

    pub fn destroy_prop_action(&self, id: PropId) {
        self.queue.enqueue(Command::DestroyProp { id });
    }

    /// Applies a capability mutation immediately and records it into the
    /// current tick's pending delta.
    pub fn mutate_prop(&self, id: &PropId, patch: PropPatch) {
        let mut guard = self.state.lock().expect("scene state lock poisoned");
        let SceneState { props, chunks, .. } = &mut *guard;
        let Some(prop) = props.iter_mut().find(|p| &p.id == id) else {
            warn!(id = %id, "mutate requested for unknown prop");
            return;
        };
        prop.caps.apply(&patch);
        if let Some(pos) = prop.caps.positioned {
            chunks.record_update(cell_of(&pos), prop.id.clone(), patch);
        }
    }

    // internals

    fn emit(&self, batch: &OutboundBatch, target: BatchTarget) {
        if let Some(handler) = self
            .subscriber
            .lock()
            .expect("subscriber lock poisoned")
            .as_ref()
        {
            handler(batch, target);
        }
    }

    /// Applies one drained command. Every failure path is a logged no-op so
    /// one bad command cannot abort the rest of the drain.
    fn apply_command(&self, st: &mut SceneState, cmd: Command) {
        match cmd {
            Command::SpawnProp { name, overrides } => {
                self.spawn_prop(st, &name, &overrides, None, None);
            }
            Command::SpawnControlledProp {
                name,
                client_id,
                name_tag,
            } => {
                self.spawn_prop(st, &name, &PropPatch::default(), Some(client_id), name_tag);
            }
            Command::DestroyProp { id } => Self::destroy_prop(st, &id),
            Command::DestroyControlledProp { client_id } => Self::destroy_by_owner(st, client_id),
            Command::ClientInput {
                client_id,
                code,
                status,
            } => Self::client_input(st, client_id, code, status),
        }
    }

    fn spawn_prop(
        &self,
        st: &mut SceneState,
        name: &str,
        overrides: &PropPatch,
        owner: Option<ClientId>,
        name_tag: Option<String>,
    ) {
        let ctx = SpawnCtx { owner };
        let Some(mut prop) = self.registry.construct(name, &ctx) else {
            return;
        };
        prop.caps.apply(overrides);
        if let Some(tag) = name_tag {
            prop.caps.name_tagged = Some(NameTagged { tag });
        }
        if owner.is_some() && prop.caps.controlled.is_none() {
            warn!(prop = %name, "controlled spawn rejected: prop type is not controllable");
            return;
        }

        info!(prop = %name, id = %prop.id, "spawned prop");
        let created_ctx = TickCtx {
            tick: st.tick_num,
            stage: &self.stage,
        };
        dispatch_hook(&mut st.chunks, &mut prop, |b, caps| {
            b.on_created(caps, &created_ctx)
        });

        // make the spawn visible to this tick's collision pass and delta
        if let Some(pos) = prop.caps.positioned {
            let coord = cell_of(&pos);
            st.chunks.file_prop(coord, prop.id.clone());
            st.chunks.record_load(coord, prop.id.clone());
        }
        st.props.push_front(prop);
    }

    fn destroy_prop(st: &mut SceneState, id: &PropId) {
        let Some(i) = st.props.iter().position(|p| &p.id == id) else {
            return;
        };
        if let Some(prop) = st.props.remove(i) {
            let coord = prop
                .caps
                .positioned
                .map(|p| cell_of(&p))
                .unwrap_or((0, 0));
            info!(id = %prop.id, "destroyed prop");
            st.chunks.record_delete(coord, prop.id);
        }
    }

    fn destroy_by_owner(st: &mut SceneState, client_id: ClientId) {
        let Some(i) = st
            .props
            .iter()
            .position(|p| p.caps.controlled.is_some_and(|c| c.client_id == client_id))
        else {
            return;
        };
        if let Some(prop) = st.props.remove(i) {
            let coord = prop
                .caps
                .positioned
                .map(|p| cell_of(&p))
                .unwrap_or((0, 0));
            info!(id = %prop.id, client_id = ?client_id, "destroyed controlled prop");
            st.chunks.record_delete(coord, prop.id);
        }
    }

    fn client_input(st: &mut SceneState, client_id: ClientId, code: ActionCode, status: ActionStatus) {
        let SceneState { props, chunks, .. } = st;
        let Some(prop) = props
            .iter_mut()
            .find(|p| p.caps.controlled.is_some_and(|c| c.client_id == client_id))
        else {
            warn!(client_id = ?client_id, "input for client with no controlled prop");
            return;
        };
        dispatch_hook(chunks, prop, |b, caps| b.on_receive(caps, code, status));
    }

    /// Fires both collision hooks for an overlapping pair. Props destroyed
    /// during this tick's drain keep their cell entry but no longer resolve
    /// here, so their callbacks are skipped rather than fired posthumously.
    fn dispatch_collision(st: &mut SceneState, a_id: &PropId, b_id: &PropId) {
        let SceneState { props, chunks, .. } = st;

        let Some(b_view) = props.iter().find(|p| &p.id == b_id).map(Prop::view) else {
            return;
        };
        if let Some(a) = props.iter_mut().find(|p| &p.id == a_id) {
            dispatch_hook(chunks, a, |b, caps| b.on_collide(caps, &b_view));
        }

        let Some(a_view) = props.iter().find(|p| &p.id == a_id).map(Prop::view) else {
            return;
        };
        if let Some(b) = props.iter_mut().find(|p| &p.id == b_id) {
            dispatch_hook(chunks, b, |beh, caps| beh.on_collide(caps, &a_view));
        }
    }
}

/// Runs a behavior hook with the take-call-restore pattern, recording any
/// change the hook makes to `positioned`/`drawable` into the pending cell
/// map so it reaches the next delta batch.
fn dispatch_hook<F>(chunks: &mut ChunkMap, prop: &mut Prop, f: F)
where
    F: FnOnce(&mut dyn PropBehavior, &mut PropCaps),
{
    let Some(mut behavior) = prop.behavior.take() else {
        return;
    };
    let before_pos = prop.caps.positioned;
    let before_draw = prop.caps.drawable.clone();
    f(behavior.as_mut(), &mut prop.caps);
    prop.behavior = Some(behavior);

    let mut patch = PropPatch::default();
    if prop.caps.positioned != before_pos {
        if let Some(pos) = prop.caps.positioned {
            patch.positioned = Some(PositionedPatch {
                pos_x: Some(pos.pos_x),
                pos_y: Some(pos.pos_y),
            });
        }
    }
    if prop.caps.drawable != before_draw {
        if let Some(draw) = &prop.caps.drawable {
            patch.drawable = Some(DrawablePatch {
                animation_code: Some(draw.animation_code.clone()),
            });
        }
    }
    if !patch.is_empty() {
        if let Some(pos) = prop.caps.positioned {
            chunks.record_update(cell_of(&pos), prop.id.clone(), patch);
        }
    }
}
