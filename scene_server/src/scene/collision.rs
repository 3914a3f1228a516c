//! Pairwise collision detection over the spatial index.
//!
//! Candidates for a cell are its own residents plus those of the 8
//! neighbouring cells (Chebyshev distance <= 1). A processed-set guard
//! ensures each unordered pair is evaluated at most once per tick. Props
//! further apart than one cell are never tested, whatever their box sizes;
//! that bound is the point of the coarse grid.

use std::collections::{HashSet, VecDeque};

use scene_shared::prop::{Collidable, Positioned, Prop, PropId};

use super::chunks::ChunkMap;

/// Standard AABB separating-axis test. Boxes that merely touch do not
/// overlap.
pub fn overlaps(a_pos: &Positioned, a_col: &Collidable, b_pos: &Positioned, b_col: &Collidable) -> bool {
    let left1 = a_pos.pos_x + a_col.offset_x;
    let top1 = a_pos.pos_y + a_col.offset_y;
    let left2 = b_pos.pos_x + b_col.offset_x;
    let top2 = b_pos.pos_y + b_col.offset_y;

    let is_left = left1 + a_col.size_x <= left2;
    let is_right = left1 >= left2 + b_col.size_x;
    let is_above = top1 + a_col.size_y <= top2;
    let is_below = top1 >= top2 + b_col.size_y;

    !(is_left || is_right || is_above || is_below)
}

/// Finds every overlapping collidable pair, each at most once. Props that no
/// longer resolve in the list (destroyed during this tick's drain) still
/// occupy their cell but are skipped here.
pub fn find_pairs(chunks: &ChunkMap, props: &VecDeque<Prop>) -> Vec<(PropId, PropId)> {
    let resolve = |id: &PropId| props.iter().find(|p| &p.id == id);

    let mut checked: HashSet<PropId> = HashSet::new();
    let mut pairs = Vec::new();

    for (coord, cell) in chunks.iter() {
        let mut candidates: Vec<&PropId> = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(adj) = chunks.get(&(coord.0 + dx, coord.1 + dy)) {
                    candidates.extend(adj.props.iter());
                }
            }
        }

        for a_id in &cell.props {
            let Some(a) = resolve(a_id) else { continue };
            let (Some(a_pos), Some(a_col)) = (a.caps.positioned, a.caps.collidable) else {
                continue;
            };

            for &b_id in &candidates {
                if b_id == a_id || checked.contains(b_id) {
                    continue;
                }
                let Some(b) = resolve(b_id) else { continue };
                let (Some(b_pos), Some(b_col)) = (b.caps.positioned, b.caps.collidable) else {
                    continue;
                };
                if overlaps(&a_pos, &a_col, &b_pos, &b_col) {
                    pairs.push((a_id.clone(), b_id.clone()));
                }
            }

            checked.insert(a_id.clone());
        }
    }

    pairs
}
