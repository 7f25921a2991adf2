use rand::Rng;
use std::collections::HashMap;

use crate::node::{Node, NodeId, Position, Size};

// Region new nodes land in when the caller gives no position
const REGION_MIN_X: f64 = 100.0;
const REGION_MIN_Y: f64 = 100.0;
const REGION_WIDTH: f64 = 400.0;
const REGION_HEIGHT: f64 = 300.0;

const GRID_STEP_X: f64 = 50.0;
const GRID_STEP_Y: f64 = 50.0;

/// Pick a spot inside the default region for a new node of `size`.
///
/// Scans the region on a coarse grid for a slot whose footprint does not
/// overlap any existing node; falls back to a random point in the region.
pub fn default_position(existing: &HashMap<NodeId, Node>, size: Size) -> Position {
    find_free_position(existing, size).unwrap_or_else(random_position)
}

fn find_free_position(existing: &HashMap<NodeId, Node>, size: Size) -> Option<Position> {
    let cols = (REGION_WIDTH / GRID_STEP_X) as usize;
    let rows = (REGION_HEIGHT / GRID_STEP_Y) as usize;

    for row in 0..=rows {
        for col in 0..=cols {
            let candidate = Position::new(
                REGION_MIN_X + col as f64 * GRID_STEP_X,
                REGION_MIN_Y + row as f64 * GRID_STEP_Y,
            );
            let overlaps = existing.values().any(|node| overlaps(node, candidate, size));
            if !overlaps {
                return Some(candidate);
            }
        }
    }
    None
}

fn overlaps(node: &Node, pos: Position, size: Size) -> bool {
    let far = node.far_corner();
    pos.x < far.x
        && pos.x + size.width > node.position.x
        && pos.y < far.y
        && pos.y + size.height > node.position.y
}

fn random_position() -> Position {
    let mut rng = rand::thread_rng();
    Position::new(
        REGION_MIN_X + rng.gen_range(0.0..REGION_WIDTH),
        REGION_MIN_Y + rng.gen_range(0.0..REGION_HEIGHT),
    )
}
