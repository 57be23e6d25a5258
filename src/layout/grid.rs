//! Masonry grid layout.
//!
//! Tasks are packed greedily into the column with the smallest accumulated
//! height, in task id order. Deterministic, no iteration, O(n · columns).
//! Positions are card centres.

use std::collections::HashMap;

use super::estimate::estimate_node_height;
use crate::config::LayoutConfig;
use crate::graph::{NodeId, TaskGraph};

/// A task placed by the grid layout.
#[derive(Debug, Clone, PartialEq)]
pub struct GridNode {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
    /// Column the node was packed into; `None` for pinned nodes.
    pub column: Option<usize>,
    pub height: f32,
}

/// Number of columns that fit the viewport (at least one).
pub fn column_count(config: &LayoutConfig) -> usize {
    let usable = config.width - 2.0 * config.margin + config.node_gap;
    let pitch = config.node_width + config.node_gap;
    ((usable / pitch).floor() as usize).max(1)
}

/// Compute grid positions, one entry per graph slot.
pub fn compute_grid_layout(
    graph: &TaskGraph,
    pinned: &HashMap<NodeId, (f32, f32)>,
    config: &LayoutConfig,
) -> Vec<GridNode> {
    let columns = column_count(config);
    let pitch = config.node_width + config.node_gap;
    let mut heights = vec![0.0f32; columns];

    let mut order: Vec<usize> = (0..graph.len()).collect();
    order.sort_by_key(|&slot| graph.task(slot).id);

    let mut placed: Vec<Option<GridNode>> = vec![None; graph.len()];
    for slot in order {
        let task = graph.task(slot);
        let id = graph.node_id(slot);
        let height = estimate_node_height(task, config.node_width);

        if let Some(&(x, y)) = pinned.get(&id) {
            placed[slot] = Some(GridNode {
                id,
                x,
                y,
                column: None,
                height,
            });
            continue;
        }

        let column = shortest_column(&heights);
        let x = config.margin + column as f32 * pitch + config.node_width / 2.0;
        let y = config.margin + heights[column] + height / 2.0;
        heights[column] += height + config.node_gap;

        placed[slot] = Some(GridNode {
            id,
            x,
            y,
            column: Some(column),
            height,
        });
    }

    placed.into_iter().flatten().collect()
}

fn shortest_column(heights: &[f32]) -> usize {
    let mut best = 0;
    for (i, &h) in heights.iter().enumerate() {
        if h < heights[best] {
            best = i;
        }
    }
    best
}
