//! Active-task focus.
//!
//! The active node is fixed at the viewport centre and the springs around it
//! are strengthened, so its dependency neighbourhood gathers around it.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::LayoutConfig;
use crate::graph::{NodeId, PhysicsLink, PhysicsNode, TaskGraph};

/// Result of applying focus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FocusReport {
    pub active: Option<NodeId>,
    /// Slots of the direct dependencies and dependents of the active node.
    pub neighbors: Vec<usize>,
    pub boosted_links: usize,
}

/// Apply (or clear) focus for `active`.
///
/// Link strengths are reset to nominal first, so calling this repeatedly is
/// idempotent. Nodes losing focus fall back to their caller pin from `pins`,
/// or become free.
pub fn apply_focus(
    nodes: &mut [PhysicsNode],
    links: &mut [PhysicsLink],
    graph: &TaskGraph,
    pins: &HashMap<NodeId, (f32, f32)>,
    active: Option<u32>,
    config: &LayoutConfig,
) -> FocusReport {
    for link in links.iter_mut() {
        link.reset_strength();
    }

    let active_slot = active.and_then(|id| graph.slot_of(NodeId::new(id)));
    if active.is_some() && active_slot.is_none() {
        debug!(task_id = active, "active task is not in the current task set");
    }

    for (slot, node) in nodes.iter_mut().enumerate() {
        if node.state.is_focused() && Some(slot) != active_slot {
            node.state.set_focused(false);
            match pins.get(&node.id) {
                Some(&(x, y)) => node.fix_at(x, y),
                None => node.unfix(),
            }
        }
    }

    let Some(slot) = active_slot else {
        return FocusReport::default();
    };

    let (cx, cy) = config.center();
    let node = &mut nodes[slot];
    node.fix_at(cx, cy);
    node.state.set_focused(true);
    let active_id = node.id;

    let neighbors: HashSet<usize> = graph.neighbors(slot);
    let mut boosted = 0;
    for link in links.iter_mut() {
        if link.touches(active_id) {
            link.strength = link.base_strength * config.focus_strength;
            boosted += 1;
        } else if neighbors.contains(&link.source_index) || neighbors.contains(&link.target_index) {
            link.strength = link.base_strength * config.neighbor_focus_strength;
            boosted += 1;
        }
    }

    let mut neighbors: Vec<usize> = neighbors.into_iter().collect();
    neighbors.sort_unstable();
    debug!(active = %active_id, neighbors = neighbors.len(), boosted, "focus applied");

    FocusReport {
        active: Some(active_id),
        neighbors,
        boosted_links: boosted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    /// 1 <- 2 <- 3 <- 4, plus 5 <- 6 unrelated.
    fn fixture() -> (TaskGraph, Vec<PhysicsNode>, Vec<PhysicsLink>) {
        let tasks = vec![
            Task::new(1, "a"),
            Task::new(2, "b").with_dependencies([1]),
            Task::new(3, "c").with_dependencies([2]),
            Task::new(4, "d").with_dependencies([3]),
            Task::new(5, "e"),
            Task::new(6, "f").with_dependencies([5]),
        ];
        let graph = TaskGraph::from_tasks(&tasks);
        let nodes = (0..graph.len())
            .map(|slot| {
                let mut n = PhysicsNode::new(graph.node_id(slot), slot);
                n.place(slot as f32 * 10.0, 0.0);
                n
            })
            .collect();
        let links = graph
            .relations()
            .iter()
            .map(|&(s, t)| PhysicsLink::new(graph.node_id(s), graph.node_id(t), s, t, 0.3))
            .collect();
        (graph, nodes, links)
    }

    #[test]
    fn test_focus_boosts_exact_link_set() {
        let config = LayoutConfig::default();
        let (graph, mut nodes, mut links) = fixture();

        let report = apply_focus(&mut nodes, &mut links, &graph, &HashMap::new(), Some(2), &config);
        assert_eq!(report.active, Some(NodeId(2)));
        assert_eq!(report.neighbors, vec![0, 2]);

        let strengths: Vec<(String, f32)> = links.iter().map(|l| (l.to_string(), l.strength)).collect();
        let expect = |name: &str| strengths.iter().find(|(n, _)| n == name).unwrap().1;
        assert!((expect("task-1->task-2") - 0.6).abs() < 1e-6);
        assert!((expect("task-2->task-3") - 0.6).abs() < 1e-6);
        assert!((expect("task-3->task-4") - 0.45).abs() < 1e-6);
        assert!((expect("task-5->task-6") - 0.3).abs() < 1e-6);
        assert_eq!(report.boosted_links, 3);

        let (cx, cy) = config.center();
        assert_eq!(nodes[1].position(), Some((cx, cy)));
        assert!(nodes[1].state.is_focused());
        assert!(nodes[1].is_fixed());
    }

    #[test]
    fn test_changing_focus_moves_boost() {
        let config = LayoutConfig::default();
        let (graph, mut nodes, mut links) = fixture();
        apply_focus(&mut nodes, &mut links, &graph, &HashMap::new(), Some(2), &config);
        apply_focus(&mut nodes, &mut links, &graph, &HashMap::new(), Some(6), &config);

        assert!(!nodes[1].is_fixed());
        assert!(!nodes[1].state.is_focused());
        let boosted: Vec<String> = links
            .iter()
            .filter(|l| l.strength != l.base_strength)
            .map(|l| l.to_string())
            .collect();
        assert_eq!(boosted, vec!["task-5->task-6".to_string()]);
    }

    #[test]
    fn test_clearing_focus_keeps_caller_pin() {
        let config = LayoutConfig::default();
        let (graph, mut nodes, mut links) = fixture();
        let mut pins = HashMap::new();
        pins.insert(NodeId(2), (5.0, 6.0));

        apply_focus(&mut nodes, &mut links, &graph, &pins, Some(2), &config);
        apply_focus(&mut nodes, &mut links, &graph, &pins, None, &config);

        assert_eq!(nodes[1].position(), Some((5.0, 6.0)));
        assert!(nodes[1].is_fixed());
        assert!(links.iter().all(|l| l.strength == l.base_strength));
    }

    #[test]
    fn test_unknown_active_task_is_ignored() {
        let config = LayoutConfig::default();
        let (graph, mut nodes, mut links) = fixture();
        let report = apply_focus(&mut nodes, &mut links, &graph, &HashMap::new(), Some(99), &config);
        assert_eq!(report, FocusReport::default());
        assert!(nodes.iter().all(|n| !n.is_fixed()));
    }
}
