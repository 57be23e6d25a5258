//! Render-ready dependency edges.
//!
//! One edge per dependency relation, drawn from the dependency (source) to
//! the dependent task (target). Relations repeating the same pair are bundled
//! and fanned out perpendicular to the edge so they stay distinguishable.

use std::collections::HashMap;

use serde::Serialize;

use crate::graph::{NodeId, TaskGraph};
use crate::task::{Priority, Status};

/// Perpendicular distance between bundled edges.
pub const BUNDLE_SPACING: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    pub color: &'static str,
    pub width: f32,
    pub opacity: f32,
    /// Dash and gap lengths; `None` draws a solid line.
    pub dash: Option<[f32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDescriptor {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    /// Perpendicular offset within the bundle.
    pub offset: f32,
    pub bundle_index: usize,
    pub bundle_size: usize,
    pub style: EdgeStyle,
}

/// Style of an edge from its endpoints' state.
///
/// A finished dependency reads as satisfied, an in-progress one as in flight
/// and a pending one as blocking. Blocking edges into active work are
/// highlighted. Width follows the target's priority.
pub fn edge_style(source: Status, target: Status, target_priority: Priority) -> EdgeStyle {
    let width = match target_priority {
        Priority::High => 3.0,
        Priority::Medium => 2.0,
        Priority::Low => 1.5,
    };

    match (source, target) {
        (Status::Done, Status::Done) => EdgeStyle {
            color: "#22c55e",
            width,
            opacity: 0.35,
            dash: None,
        },
        (Status::Done, _) => EdgeStyle {
            color: "#22c55e",
            width,
            opacity: 0.8,
            dash: None,
        },
        (Status::InProgress, _) => EdgeStyle {
            color: "#3b82f6",
            width,
            opacity: 0.9,
            dash: Some([8.0, 4.0]),
        },
        (Status::Pending, Status::InProgress) => EdgeStyle {
            color: "#f59e0b",
            width: width + 0.5,
            opacity: 1.0,
            dash: Some([4.0, 4.0]),
        },
        (Status::Pending, _) => EdgeStyle {
            color: "#9ca3af",
            width,
            opacity: 0.6,
            dash: Some([4.0, 4.0]),
        },
    }
}

/// Offset of edge `index` in a bundle of `count`; offsets sum to zero.
#[inline]
pub fn bundle_offset(index: usize, count: usize) -> f32 {
    (index as f32 - (count as f32 - 1.0) / 2.0) * BUNDLE_SPACING
}

/// Build one descriptor per relation of `graph`.
pub fn build_edges(graph: &TaskGraph) -> Vec<EdgeDescriptor> {
    let relations = graph.relations();

    let mut bundle_sizes: HashMap<(usize, usize), usize> = HashMap::new();
    for &pair in relations {
        *bundle_sizes.entry(pair).or_default() += 1;
    }

    let mut seen: HashMap<(usize, usize), usize> = HashMap::new();
    relations
        .iter()
        .map(|&(s, t)| {
            let count = bundle_sizes[&(s, t)];
            let index = seen.entry((s, t)).or_default();
            let bundle_index = *index;
            *index += 1;

            let source = graph.node_id(s);
            let target = graph.node_id(t);
            let target_task = graph.task(t);
            EdgeDescriptor {
                id: format!("{source}->{target}#{bundle_index}"),
                source,
                target,
                offset: bundle_offset(bundle_index, count),
                bundle_index,
                bundle_size: count,
                style: edge_style(graph.task(s).status, target_task.status, target_task.priority),
            }
        })
        .collect()
}
