//! Per-tick spatial index and delta aggregation.
//!
//! Every tick the scene files each positioned prop into a coarse grid cell
//! by floor-division of its coordinates. Cells double as the tick's mutation
//! record: capability updates, newly loaded props, and deletions accumulate
//! per cell and are merged into outbound batches at the end of the tick.
//! The whole map is rebuilt from scratch every tick, never persisted.

use std::collections::{BTreeMap, HashMap, VecDeque};

use scene_shared::net::{OutboundBatch, PropSnapshot};
use scene_shared::prop::{Positioned, Prop, PropId, PropPatch};

/// Grid cell edge length, in world units.
pub const CELL_SIZE: f32 = 256.0;

/// Grid coordinate of a cell.
pub type CellCoord = (i32, i32);

/// Computes the cell a position falls into.
pub fn cell_of(pos: &Positioned) -> CellCoord {
    (
        (pos.pos_x / CELL_SIZE).floor() as i32,
        (pos.pos_y / CELL_SIZE).floor() as i32,
    )
}

/// Transient record for one occupied cell.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    /// Props resident as of the index build, plus same-tick spawns.
    pub props: Vec<PropId>,
    /// Capability updates recorded this tick, keyed by prop.
    pub updates: HashMap<PropId, PropPatch>,
    /// Props newly loaded this tick.
    pub load: Vec<PropId>,
    /// Props deleted this tick.
    pub deleted: Vec<PropId>,
}

/// The spatial index: cell coordinate -> cell record. A `BTreeMap` keeps
/// read-out order stable across ticks.
#[derive(Debug, Clone, Default)]
pub struct ChunkMap {
    cells: BTreeMap<CellCoord, Cell>,
}

impl ChunkMap {
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn get(&self, coord: &CellCoord) -> Option<&Cell> {
        self.cells.get(coord)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellCoord, &Cell)> {
        self.cells.iter()
    }

    fn cell_mut(&mut self, coord: CellCoord) -> &mut Cell {
        self.cells.entry(coord).or_default()
    }

    /// Files a prop as resident in a cell.
    pub fn file_prop(&mut self, coord: CellCoord, id: PropId) {
        self.cell_mut(coord).props.push(id);
    }

    /// Records a prop newly loaded this tick.
    pub fn record_load(&mut self, coord: CellCoord, id: PropId) {
        self.cell_mut(coord).load.push(id);
    }

    /// Records a prop deleted this tick.
    pub fn record_delete(&mut self, coord: CellCoord, id: PropId) {
        self.cell_mut(coord).deleted.push(id);
    }

    /// Records a capability update, merging field-by-field with anything
    /// already recorded for the same prop in this cell.
    pub fn record_update(&mut self, coord: CellCoord, id: PropId, patch: PropPatch) {
        let cell = self.cell_mut(coord);
        match cell.updates.get_mut(&id) {
            Some(existing) => existing.merge(&patch),
            None => {
                cell.updates.insert(id, patch);
            }
        }
    }

    /// Full snapshot: every resident prop that carries `drawable`, projected
    /// for a newly connected client. `None` when there is nothing to load.
    pub fn full_batch(&self, props: &VecDeque<Prop>) -> Option<OutboundBatch> {
        let mut load = Vec::new();
        for cell in self.cells.values() {
            for id in &cell.props {
                if let Some(snap) = resolve(props, id).and_then(snapshot_of) {
                    load.push(snap);
                }
            }
        }
        if load.is_empty() {
            return None;
        }
        Some(OutboundBatch {
            load: Some(load),
            ..Default::default()
        })
    }

    /// Delta: merged capability updates, loads of newly spawned props, and
    /// deletions. Only `positioned` and `drawable` updates reach the wire;
    /// later cells' entries overwrite earlier ones per capability key.
    /// `None` when the tick produced nothing.
    pub fn delta_batch(&self, props: &VecDeque<Prop>) -> Option<OutboundBatch> {
        let mut update: HashMap<PropId, PropPatch> = HashMap::new();
        let mut load = Vec::new();
        let mut delete = Vec::new();

        for cell in self.cells.values() {
            for (id, patch) in &cell.updates {
                if patch.positioned.is_none() && patch.drawable.is_none() {
                    continue;
                }
                let entry = update.entry(id.clone()).or_default();
                if let Some(p) = &patch.positioned {
                    entry.positioned = Some(*p);
                }
                if let Some(d) = &patch.drawable {
                    entry.drawable = Some(d.clone());
                }
            }
            for id in &cell.load {
                if let Some(snap) = resolve(props, id).and_then(snapshot_of) {
                    load.push(snap);
                }
            }
            delete.extend(cell.deleted.iter().cloned());
        }

        if update.is_empty() && load.is_empty() && delete.is_empty() {
            return None;
        }
        Some(OutboundBatch {
            load: (!load.is_empty()).then_some(load),
            update: (!update.is_empty()).then_some(update),
            delete: (!delete.is_empty()).then_some(delete),
        })
    }
}

fn resolve<'a>(props: &'a VecDeque<Prop>, id: &PropId) -> Option<&'a Prop> {
    props.iter().find(|p| &p.id == id)
}

fn snapshot_of(prop: &Prop) -> Option<PropSnapshot> {
    let drawable = prop.caps.drawable.clone()?;
    let positioned = prop.caps.positioned?;
    Some(PropSnapshot {
        id: prop.id.clone(),
        drawable,
        positioned,
        name_tagged: prop.caps.name_tagged.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_shared::prop::{Drawable, DrawablePatch, PositionedPatch, PropCaps};

    fn positioned(x: f32, y: f32) -> Positioned {
        Positioned { pos_x: x, pos_y: y }
    }

    fn drawable_prop(x: f32, y: f32) -> Prop {
        Prop::new(PropCaps {
            positioned: Some(positioned(x, y)),
            drawable: Some(Drawable {
                animation_code: "idle".into(),
            }),
            ..Default::default()
        })
    }

    #[test]
    fn cell_of_floor_divides() {
        assert_eq!(cell_of(&positioned(0.0, 0.0)), (0, 0));
        assert_eq!(cell_of(&positioned(255.9, 255.9)), (0, 0));
        assert_eq!(cell_of(&positioned(256.0, 0.0)), (1, 0));
        assert_eq!(cell_of(&positioned(-1.0, -257.0)), (-1, -2));
    }

    #[test]
    fn update_records_merge_per_field() {
        let mut chunks = ChunkMap::default();
        let id = PropId("p".into());
        chunks.record_update(
            (0, 0),
            id.clone(),
            PropPatch {
                positioned: Some(PositionedPatch {
                    pos_x: Some(5.0),
                    pos_y: None,
                }),
                ..Default::default()
            },
        );
        chunks.record_update(
            (0, 0),
            id.clone(),
            PropPatch {
                drawable: Some(DrawablePatch {
                    animation_code: Some("run".into()),
                }),
                ..Default::default()
            },
        );

        let batch = chunks.delta_batch(&VecDeque::new()).expect("delta");
        let patch = &batch.update.unwrap()[&id];
        assert_eq!(patch.positioned.unwrap().pos_x, Some(5.0));
        assert_eq!(
            patch.drawable.as_ref().unwrap().animation_code.as_deref(),
            Some("run")
        );
    }

    #[test]
    fn delta_ignores_non_replicated_capabilities() {
        let mut chunks = ChunkMap::default();
        chunks.record_update(
            (0, 0),
            PropId("p".into()),
            PropPatch {
                collidable: Some(Default::default()),
                ..Default::default()
            },
        );
        assert!(chunks.delta_batch(&VecDeque::new()).is_none());
    }

    #[test]
    fn empty_map_yields_no_batches() {
        let chunks = ChunkMap::default();
        assert!(chunks.full_batch(&VecDeque::new()).is_none());
        assert!(chunks.delta_batch(&VecDeque::new()).is_none());
    }

    #[test]
    fn full_batch_projects_drawable_residents_only() {
        let mut props = VecDeque::new();
        let visible = drawable_prop(10.0, 10.0);
        let visible_id = visible.id.clone();
        let hidden = Prop::new(PropCaps {
            positioned: Some(positioned(20.0, 20.0)),
            ..Default::default()
        });

        let mut chunks = ChunkMap::default();
        chunks.file_prop((0, 0), visible.id.clone());
        chunks.file_prop((0, 0), hidden.id.clone());
        props.push_front(visible);
        props.push_front(hidden);

        let batch = chunks.full_batch(&props).expect("full");
        let load = batch.load.unwrap();
        assert_eq!(load.len(), 1);
        assert_eq!(load[0].id, visible_id);
    }

    #[test]
    fn delta_load_skips_props_destroyed_after_spawn() {
        let mut chunks = ChunkMap::default();
        let ghost = PropId("gone".into());
        chunks.record_load((0, 0), ghost.clone());
        chunks.record_delete((0, 0), ghost.clone());

        let batch = chunks.delta_batch(&VecDeque::new()).expect("delta");
        assert!(batch.load.is_none());
        assert_eq!(batch.delete.unwrap(), vec![ghost]);
    }
}
