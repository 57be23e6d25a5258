//! Dependency-level layout.
//!
//! Each task is placed in the column of its dependency level (see
//! [`TaskGraph::levels`]). Within a column, rows are ordered by priority
//! (high first), then status (in progress, pending, done), then id.
//!
//! # Wrapping
//!
//! Levels that would run past the right edge of the viewport wrap into a new
//! band of rows below the previous band.
//!
//! # Overlap correction
//!
//! Rows sit on a fixed `row_spacing` grid. When a card is taller than its
//! row, the following card is pushed below it and shifted left by
//! `overlap_shift` per consecutive overlap so stacked cards stay readable.

use std::collections::HashMap;

use super::estimate::estimate_node_height;
use crate::config::LayoutConfig;
use crate::graph::{LevelAssignment, NodeId, TaskGraph};

/// A task placed by the dependency-level layout.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
    pub level: u32,
    /// Row within the level column.
    pub row: usize,
    pub height: f32,
    pub pinned: bool,
}

/// Output of the dependency-level layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyLayout {
    /// One node per graph slot.
    pub nodes: Vec<GraphNode>,
    pub levels: LevelAssignment,
}

/// Number of level columns that fit in one band (at least one).
pub fn levels_per_band(config: &LayoutConfig) -> usize {
    let usable = config.width - 2.0 * config.margin - config.node_width;
    if usable < 0.0 {
        return 1;
    }
    (usable / config.level_spacing).floor() as usize + 1
}

/// Compute dependency-level positions.
pub fn compute_dependency_layout(
    graph: &TaskGraph,
    pinned: &HashMap<NodeId, (f32, f32)>,
    config: &LayoutConfig,
) -> DependencyLayout {
    let levels = graph.levels();
    let level_count = if graph.is_empty() {
        0
    } else {
        levels.max_level() as usize + 1
    };

    let mut columns: Vec<Vec<usize>> = vec![Vec::new(); level_count];
    for slot in 0..graph.len() {
        columns[levels.levels[slot] as usize].push(slot);
    }
    for column in &mut columns {
        column.sort_by_key(|&slot| {
            let task = graph.task(slot);
            (task.priority.rank(), task.status.rank(), task.id)
        });
    }

    let per_band = levels_per_band(config);
    let mut placed: Vec<Option<GraphNode>> = vec![None; graph.len()];
    let mut band_top = config.margin;

    for (band, band_columns) in columns.chunks(per_band).enumerate() {
        let mut band_bottom = band_top;

        for (offset, column) in band_columns.iter().enumerate() {
            let level = (band * per_band + offset) as u32;
            let column_x = config.margin + config.node_width / 2.0 + offset as f32 * config.level_spacing;

            let mut prev_bottom = f32::NEG_INFINITY;
            let mut consecutive_overlaps = 0u32;

            for (row, &slot) in column.iter().enumerate() {
                let task = graph.task(slot);
                let id = graph.node_id(slot);
                let height = estimate_node_height(task, config.node_width);

                let mut top = band_top + row as f32 * config.row_spacing;
                let mut x = column_x;
                if top < prev_bottom {
                    consecutive_overlaps += 1;
                    x -= config.overlap_shift * consecutive_overlaps as f32;
                    top = prev_bottom;
                } else {
                    consecutive_overlaps = 0;
                }
                prev_bottom = top + height + config.node_gap / 2.0;
                band_bottom = band_bottom.max(top + height);

                let (x, y, is_pinned) = match pinned.get(&id) {
                    Some(&(px, py)) => (px, py, true),
                    None => (x, top + height / 2.0, false),
                };

                placed[slot] = Some(GraphNode {
                    id,
                    x,
                    y,
                    level,
                    row,
                    height,
                    pinned: is_pinned,
                });
            }
        }

        band_top = band_bottom + config.row_spacing;
    }

    DependencyLayout {
        nodes: placed.into_iter().flatten().collect(),
        levels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, Status, Subtask, Task};

    fn task(id: u32, deps: &[u32]) -> Task {
        Task::new(id, format!("Task {id}")).with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_three_level_chain_gets_own_columns() {
        let config = LayoutConfig::default();
        let graph = TaskGraph::from_tasks(&[task(1, &[]), task(2, &[1]), task(3, &[1, 2])]);
        let layout = compute_dependency_layout(&graph, &HashMap::new(), &config);

        let levels: Vec<u32> = layout.nodes.iter().map(|n| n.level).collect();
        assert_eq!(levels, vec![0, 1, 2]);
        assert!(layout.nodes[0].x < layout.nodes[1].x);
        assert!(layout.nodes[1].x < layout.nodes[2].x);
        assert!(layout.nodes.iter().all(|n| !n.pinned));
        // every node heads its column
        assert!(layout.nodes.iter().all(|n| n.row == 0));
    }

    #[test]
    fn test_cycle_members_at_level_zero() {
        let config = LayoutConfig::default();
        let graph = TaskGraph::from_tasks(&[task(1, &[2]), task(2, &[1]), task(3, &[2])]);
        let layout = compute_dependency_layout(&graph, &HashMap::new(), &config);

        assert_eq!(layout.nodes[0].level, 0);
        assert_eq!(layout.nodes[1].level, 0);
        assert_eq!(layout.nodes[2].level, 1);
        assert_eq!(layout.levels.cycle_members, vec![0, 1]);
    }

    #[test]
    fn test_rows_sorted_by_priority_status_id() {
        let config = LayoutConfig::default();
        let graph = TaskGraph::from_tasks(&[
            task(1, &[]).with_priority(Priority::Low),
            task(2, &[]).with_priority(Priority::High).with_status(Status::Done),
            task(3, &[]).with_priority(Priority::High).with_status(Status::InProgress),
            task(4, &[]).with_priority(Priority::High).with_status(Status::Done),
        ]);
        let layout = compute_dependency_layout(&graph, &HashMap::new(), &config);
        let rows: Vec<usize> = layout.nodes.iter().map(|n| n.row).collect();
        // slot order: 1, 2, 3, 4
        assert_eq!(rows, vec![3, 1, 0, 2]);
    }

    #[test]
    fn test_levels_wrap_into_bands() {
        let config = LayoutConfig::default();
        assert_eq!(levels_per_band(&config), 3);

        let tasks: Vec<Task> = (1..=5u32)
            .map(|i| if i == 1 { task(1, &[]) } else { task(i, &[i - 1]) })
            .collect();
        let graph = TaskGraph::from_tasks(&tasks);
        let layout = compute_dependency_layout(&graph, &HashMap::new(), &config);

        // level 3 wraps back to the first column position, below band 0
        assert_eq!(layout.nodes[3].x, layout.nodes[0].x);
        assert!(layout.nodes[3].y > layout.nodes[0].y);
        for node in &layout.nodes {
            assert!(node.x + config.node_width / 2.0 <= config.width);
        }
    }

    #[test]
    fn test_tall_card_shifts_following_rows_left() {
        let config = LayoutConfig::default();
        let tall = task(1, &[]).with_priority(Priority::High).with_subtasks(
            (0..10)
                .map(|i| Subtask {
                    id: i,
                    ..Subtask::default()
                })
                .collect(),
        );
        let graph = TaskGraph::from_tasks(&[tall, task(2, &[]), task(3, &[])]);
        let layout = compute_dependency_layout(&graph, &HashMap::new(), &config);

        let first = &layout.nodes[0];
        let second = &layout.nodes[1];
        assert!(second.x < first.x);
        let first_bottom = first.y + first.height / 2.0;
        let second_top = second.y - second.height / 2.0;
        assert!(second_top >= first_bottom);
    }

    #[test]
    fn test_pinned_positions_verbatim() {
        let config = LayoutConfig::default();
        let graph = TaskGraph::from_tasks(&[task(1, &[]), task(2, &[1])]);
        let mut pinned = HashMap::new();
        pinned.insert(NodeId(2), (12.5, 34.5));
        let layout = compute_dependency_layout(&graph, &pinned, &config);

        assert_eq!((layout.nodes[1].x, layout.nodes[1].y), (12.5, 34.5));
        assert!(layout.nodes[1].pinned);
        assert_eq!(layout.nodes[1].level, 1);
    }

    #[test]
    fn test_empty_graph() {
        let config = LayoutConfig::default();
        let graph = TaskGraph::from_tasks(&[]);
        let layout = compute_dependency_layout(&graph, &HashMap::new(), &config);
        assert!(layout.nodes.is_empty());
    }
}
