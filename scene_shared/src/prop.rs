//! Prop/capability data model.
//!
//! A prop is a server-authoritative simulated object. Instead of a type
//! hierarchy it carries an open set of optional capabilities; the presence of
//! a capability decides which subsystems touch the prop: a prop is spatially
//! indexed iff it is `positioned`, collision-tested iff it is additionally
//! `collidable`, replicated to clients iff `drawable`, and so on.
//!
//! Reactions (tick, creation, collision, input) live in a [`PropBehavior`]
//! trait object attached to the prop, kept separate from the capability data
//! so hooks can mutate their own prop while the scene holds the list.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::net::{ActionCode, ActionStatus, ClientId};
use crate::stage::Stage;

static NEXT_PROP_ID: AtomicU64 = AtomicU64::new(1);

/// Unique string identifier of a prop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropId(pub String);

impl PropId {
    pub fn new_unique() -> Self {
        PropId(format!("prop_{}", NEXT_PROP_ID.fetch_add(1, Ordering::Relaxed)))
    }
}

impl fmt::Display for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// World position, in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Positioned {
    pub pos_x: f32,
    pub pos_y: f32,
}

/// Visual representation replicated to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Drawable {
    pub animation_code: String,
}

/// Axis-aligned collision box, relative to the prop's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Collidable {
    pub offset_x: f32,
    pub offset_y: f32,
    pub size_x: f32,
    pub size_y: f32,
}

/// Ownership by a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Controlled {
    pub client_id: ClientId,
}

/// Display name shown above the prop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NameTagged {
    pub tag: String,
}

/// The capability record of a prop. Fields compose independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PropCaps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positioned: Option<Positioned>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawable: Option<Drawable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collidable: Option<Collidable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controlled: Option<Controlled>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_tagged: Option<NameTagged>,
}

/// Partial update of [`Positioned`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PositionedPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_y: Option<f32>,
}

/// Partial update of [`Drawable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DrawablePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation_code: Option<String>,
}

/// Partial update of [`Collidable`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CollidablePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_y: Option<f32>,
}

/// Partial update of [`NameTagged`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NameTaggedPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Partial capability update: per-capability patches, each field optional.
///
/// Used both for spawn-time overrides and for the `update` entries of an
/// outbound delta batch (where only `positioned` and `drawable` ever appear
/// on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PropPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positioned: Option<PositionedPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawable: Option<DrawablePatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collidable: Option<CollidablePatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_tagged: Option<NameTaggedPatch>,
}

impl PropPatch {
    pub fn is_empty(&self) -> bool {
        self.positioned.is_none()
            && self.drawable.is_none()
            && self.collidable.is_none()
            && self.name_tagged.is_none()
    }

    /// Convenience: a patch setting both position axes.
    pub fn position(pos_x: f32, pos_y: f32) -> Self {
        Self {
            positioned: Some(PositionedPatch {
                pos_x: Some(pos_x),
                pos_y: Some(pos_y),
            }),
            ..Default::default()
        }
    }

    /// Field-level merge: fields set in `other` win, everything else is kept.
    pub fn merge(&mut self, other: &PropPatch) {
        if let Some(p) = &other.positioned {
            let cur = self.positioned.get_or_insert_with(Default::default);
            if p.pos_x.is_some() {
                cur.pos_x = p.pos_x;
            }
            if p.pos_y.is_some() {
                cur.pos_y = p.pos_y;
            }
        }
        if let Some(d) = &other.drawable {
            let cur = self.drawable.get_or_insert_with(Default::default);
            if d.animation_code.is_some() {
                cur.animation_code = d.animation_code.clone();
            }
        }
        if let Some(c) = &other.collidable {
            let cur = self.collidable.get_or_insert_with(Default::default);
            if c.offset_x.is_some() {
                cur.offset_x = c.offset_x;
            }
            if c.offset_y.is_some() {
                cur.offset_y = c.offset_y;
            }
            if c.size_x.is_some() {
                cur.size_x = c.size_x;
            }
            if c.size_y.is_some() {
                cur.size_y = c.size_y;
            }
        }
        if let Some(n) = &other.name_tagged {
            let cur = self.name_tagged.get_or_insert_with(Default::default);
            if n.tag.is_some() {
                cur.tag = n.tag.clone();
            }
        }
    }
}

impl PropCaps {
    /// Shallow per-capability merge: a patched capability that is already
    /// present keeps its unmentioned fields; an absent one is constructed
    /// from its defaults first.
    pub fn apply(&mut self, patch: &PropPatch) {
        if let Some(p) = &patch.positioned {
            let cur = self.positioned.get_or_insert_with(Default::default);
            if let Some(x) = p.pos_x {
                cur.pos_x = x;
            }
            if let Some(y) = p.pos_y {
                cur.pos_y = y;
            }
        }
        if let Some(d) = &patch.drawable {
            let cur = self.drawable.get_or_insert_with(Default::default);
            if let Some(code) = &d.animation_code {
                cur.animation_code = code.clone();
            }
        }
        if let Some(c) = &patch.collidable {
            let cur = self.collidable.get_or_insert_with(Default::default);
            if let Some(v) = c.offset_x {
                cur.offset_x = v;
            }
            if let Some(v) = c.offset_y {
                cur.offset_y = v;
            }
            if let Some(v) = c.size_x {
                cur.size_x = v;
            }
            if let Some(v) = c.size_y {
                cur.size_y = v;
            }
        }
        if let Some(n) = &patch.name_tagged {
            let cur = self.name_tagged.get_or_insert_with(Default::default);
            if let Some(tag) = &n.tag {
                cur.tag = tag.clone();
            }
        }
    }
}

/// Context handed to creation and tick hooks.
pub struct TickCtx<'a> {
    /// Current tick counter.
    pub tick: u64,
    /// Static stage geometry, for solidity queries.
    pub stage: &'a Stage,
}

/// Read-only snapshot of another prop, as seen by collision hooks.
#[derive(Debug, Clone)]
pub struct PropView {
    pub id: PropId,
    pub caps: PropCaps,
}

/// Reactions attached to a prop. All hooks are optional.
pub trait PropBehavior: Send {
    /// Fired once when the prop enters the scene.
    fn on_created(&mut self, _caps: &mut PropCaps, _ctx: &TickCtx) {}

    /// Fired every tick, before queued commands are applied.
    fn on_tick(&mut self, _caps: &mut PropCaps, _ctx: &TickCtx) {}

    /// Fired when this prop's collision box overlaps another's.
    fn on_collide(&mut self, _caps: &mut PropCaps, _other: &PropView) {}

    /// Fired when the owning client sends an input action.
    fn on_receive(&mut self, _caps: &mut PropCaps, _code: ActionCode, _status: ActionStatus) {}
}

/// A live prop: identity, capability record, optional behavior.
pub struct Prop {
    pub id: PropId,
    pub caps: PropCaps,
    pub behavior: Option<Box<dyn PropBehavior>>,
}

impl Prop {
    pub fn new(caps: PropCaps) -> Self {
        Self {
            id: PropId::new_unique(),
            caps,
            behavior: None,
        }
    }

    pub fn with_behavior(caps: PropCaps, behavior: impl PropBehavior + 'static) -> Self {
        Self {
            id: PropId::new_unique(),
            caps,
            behavior: Some(Box::new(behavior)),
        }
    }

    pub fn view(&self) -> PropView {
        PropView {
            id: self.id.clone(),
            caps: self.caps.clone(),
        }
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prop")
            .field("id", &self.id)
            .field("caps", &self.caps)
            .field("behavior", &self.behavior.is_some())
            .finish()
    }
}
