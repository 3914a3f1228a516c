//! Replicated world state.
//!
//! The client keeps a flat map of prop snapshots and folds incoming batches
//! into it: `load` entries insert, `update` entries merge field by field,
//! `delete` entries remove.

use std::collections::HashMap;

use scene_shared::net::{OutboundBatch, PropSnapshot};
use scene_shared::prop::{PropId, PropPatch};

/// Client-side mirror of the replicated props.
#[derive(Debug, Default)]
pub struct WorldView {
    props: HashMap<PropId, PropSnapshot>,
}

impl WorldView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a state batch into the view.
    pub fn apply(&mut self, batch: &OutboundBatch) {
        if let Some(load) = &batch.load {
            for snap in load {
                self.props.insert(snap.id.clone(), snap.clone());
            }
        }
        if let Some(update) = &batch.update {
            for (id, patch) in update {
                if let Some(snap) = self.props.get_mut(id) {
                    apply_patch(snap, patch);
                }
            }
        }
        if let Some(delete) = &batch.delete {
            for id in delete {
                self.props.remove(id);
            }
        }
    }

    pub fn get(&self, id: &PropId) -> Option<&PropSnapshot> {
        self.props.get(id)
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropId, &PropSnapshot)> {
        self.props.iter()
    }
}

fn apply_patch(snap: &mut PropSnapshot, patch: &PropPatch) {
    if let Some(p) = &patch.positioned {
        if let Some(x) = p.pos_x {
            snap.positioned.pos_x = x;
        }
        if let Some(y) = p.pos_y {
            snap.positioned.pos_y = y;
        }
    }
    if let Some(d) = &patch.drawable {
        if let Some(code) = &d.animation_code {
            snap.drawable.animation_code = code.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_shared::prop::{Drawable, Positioned, PositionedPatch};

    fn snap(id: &str, x: f32, y: f32) -> PropSnapshot {
        PropSnapshot {
            id: PropId(id.into()),
            drawable: Drawable {
                animation_code: "idle".into(),
            },
            positioned: Positioned { pos_x: x, pos_y: y },
            name_tagged: None,
        }
    }

    #[test]
    fn load_then_update_then_delete() {
        let mut world = WorldView::new();
        world.apply(&OutboundBatch {
            load: Some(vec![snap("prop_1", 1.0, 2.0)]),
            ..Default::default()
        });
        assert_eq!(world.len(), 1);

        let mut update = HashMap::new();
        update.insert(
            PropId("prop_1".into()),
            PropPatch {
                positioned: Some(PositionedPatch {
                    pos_x: Some(9.0),
                    pos_y: None,
                }),
                ..Default::default()
            },
        );
        world.apply(&OutboundBatch {
            update: Some(update),
            ..Default::default()
        });
        let got = world.get(&PropId("prop_1".into())).unwrap();
        assert_eq!(got.positioned.pos_x, 9.0);
        assert_eq!(got.positioned.pos_y, 2.0);

        world.apply(&OutboundBatch {
            delete: Some(vec![PropId("prop_1".into())]),
            ..Default::default()
        });
        assert!(world.is_empty());
    }

    #[test]
    fn update_for_unknown_prop_is_ignored() {
        let mut world = WorldView::new();
        let mut update = HashMap::new();
        update.insert(PropId("ghost".into()), PropPatch::position(1.0, 1.0));
        world.apply(&OutboundBatch {
            update: Some(update),
            ..Default::default()
        });
        assert!(world.is_empty());
    }
}
