//! Dependency clustering.
//!
//! Tasks sharing their lowest-id dependency form a cluster; tasks without
//! dependencies cluster by priority. Each cluster owns an angular slot around
//! the viewport centre so sibling groups drift apart in direction.

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use crate::graph::{PhysicsNode, TaskGraph};
use crate::task::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClusterKey {
    /// Task id of the shared dependency.
    Dependency(u32),
    /// Root tasks, grouped by priority rank.
    Root(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub key: ClusterKey,
    /// Member slots.
    pub members: Vec<usize>,
    /// Direction of the cluster's slot, radians.
    pub angle: f32,
}

/// Group graph slots into clusters. Singleton groups are omitted.
pub fn build_clusters(graph: &TaskGraph) -> Vec<Cluster> {
    let mut groups: BTreeMap<ClusterKey, Vec<usize>> = BTreeMap::new();
    for slot in 0..graph.len() {
        let key = graph
            .dependencies(slot)
            .into_iter()
            .map(|dep| graph.task(dep).id)
            .min()
            .map(ClusterKey::Dependency)
            .unwrap_or_else(|| root_key(graph.task(slot).priority));
        groups.entry(key).or_default().push(slot);
    }

    let groups: Vec<_> = groups.into_iter().filter(|(_, m)| m.len() > 1).collect();
    let count = groups.len().max(1) as f32;
    groups
        .into_iter()
        .enumerate()
        .map(|(i, (key, members))| Cluster {
            key,
            members,
            angle: TAU * i as f32 / count,
        })
        .collect()
}

fn root_key(priority: Priority) -> ClusterKey {
    ClusterKey::Root(priority.rank())
}

/// Pull members towards their cluster target.
///
/// The target blends the members' current centroid with the cluster's slot
/// on a circle of radius `spread` around `center`.
pub fn apply_cluster_force(
    nodes: &mut [PhysicsNode],
    clusters: &[Cluster],
    center: (f32, f32),
    spread: f32,
    strength: f32,
    alpha: f32,
) {
    let k = strength * alpha;
    for cluster in clusters {
        let count = cluster.members.len() as f32;
        let (sx, sy) = cluster
            .members
            .iter()
            .fold((0.0, 0.0), |(sx, sy), &m| (sx + nodes[m].x, sy + nodes[m].y));
        let (cx, cy) = (sx / count, sy / count);

        let tx = 0.5 * (cx + center.0 + spread * cluster.angle.cos());
        let ty = 0.5 * (cy + center.1 + spread * cluster.angle.sin());

        for &m in &cluster.members {
            let node = &mut nodes[m];
            if node.is_fixed() {
                continue;
            }
            node.vx += (tx - node.x) * k;
            node.vy += (ty - node.y) * k;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use crate::task::Task;

    #[test]
    fn test_clusters_by_lowest_dependency() {
        let tasks = vec![
            Task::new(1, "root"),
            Task::new(2, "root"),
            Task::new(3, "a").with_dependencies([2, 1]),
            Task::new(4, "b").with_dependencies([1]),
            Task::new(5, "c").with_dependencies([2]),
        ];
        let graph = TaskGraph::from_tasks(&tasks);
        let clusters = build_clusters(&graph);

        let by_dep = clusters
            .iter()
            .find(|c| c.key == ClusterKey::Dependency(1))
            .unwrap();
        assert_eq!(by_dep.members, vec![2, 3]);

        // the two roots share medium priority
        let roots = clusters
            .iter()
            .find(|c| c.key == ClusterKey::Root(Priority::Medium.rank()))
            .unwrap();
        assert_eq!(roots.members, vec![0, 1]);

        // task 5 is alone under dependency 2
        assert!(clusters.iter().all(|c| c.key != ClusterKey::Dependency(2)));
    }

    #[test]
    fn test_cluster_angles_are_distinct() {
        let tasks = vec![
            Task::new(1, "r").with_priority(Priority::High),
            Task::new(2, "r").with_priority(Priority::High),
            Task::new(3, "r").with_priority(Priority::Low),
            Task::new(4, "r").with_priority(Priority::Low),
        ];
        let clusters = build_clusters(&TaskGraph::from_tasks(&tasks));
        assert_eq!(clusters.len(), 2);
        assert!((clusters[0].angle - clusters[1].angle).abs() > 1.0);
    }

    #[test]
    fn test_cluster_force_pulls_members_together() {
        let mut nodes: Vec<PhysicsNode> = (0..2)
            .map(|i| {
                let mut n = PhysicsNode::new(NodeId(i), i as usize);
                n.place(if i == 0 { -500.0 } else { 500.0 }, 0.0);
                n
            })
            .collect();
        let clusters = vec![Cluster {
            key: ClusterKey::Root(1),
            members: vec![0, 1],
            angle: 0.0,
        }];
        apply_cluster_force(&mut nodes, &clusters, (0.0, 0.0), 100.0, 0.1, 1.0);
        assert!(nodes[0].vx > 0.0);
        assert!(nodes[1].vx < 0.0);
    }
}
