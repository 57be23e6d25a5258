//! TaskGraph - dependency topology of one task set.
//!
//! The TaskGraph stores the dependency structure using petgraph's StableGraph
//! with one node per task (slot order = task order) and one directed edge per
//! resolvable dependency relation, pointing from the dependency to the task
//! that depends on it. Dangling ids, duplicate task ids and self-dependencies
//! are tolerated and reported rather than rejected.

use petgraph::algo::kosaraju_scc;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::{Directed, Direction};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use super::node::NodeId;
use crate::task::Task;

/// Dependency levels computed for the dependency-graph layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelAssignment {
    /// Level per slot.
    pub levels: Vec<u32>,
    /// Slots that are part of a dependency cycle (assigned level 0).
    pub cycle_members: Vec<usize>,
}

impl LevelAssignment {
    pub fn max_level(&self) -> u32 {
        self.levels.iter().copied().max().unwrap_or(0)
    }
}

/// Dependency topology of a task set.
pub struct TaskGraph {
    /// Nodes store their NodeId; edges run dependency -> dependent.
    graph: StableGraph<NodeId, (), Directed>,

    /// Map from NodeId to petgraph NodeIndex
    node_id_to_index: HashMap<NodeId, NodeIndex>,

    /// Tasks in slot order
    tasks: Vec<Task>,

    /// Every resolvable relation as (dependency slot, dependent slot), duplicates kept
    relations: Vec<(usize, usize)>,

    /// Slots of tasks that list themselves as a dependency
    self_dependent: HashSet<usize>,

    dropped_relations: usize,
    duplicate_tasks: usize,
}

impl TaskGraph {
    /// Build the topology for `tasks`.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut graph = StableGraph::with_capacity(tasks.len(), tasks.len() * 2);
        let mut node_id_to_index = HashMap::with_capacity(tasks.len());
        let mut kept = Vec::with_capacity(tasks.len());
        let mut duplicate_tasks = 0;

        for task in tasks {
            let id = NodeId::new(task.id);
            if node_id_to_index.contains_key(&id) {
                warn!(task_id = task.id, "duplicate task id, keeping first occurrence");
                duplicate_tasks += 1;
                continue;
            }
            let index = graph.add_node(id);
            node_id_to_index.insert(id, index);
            kept.push(task.clone());
        }

        let mut relations = Vec::new();
        let mut self_dependent = HashSet::new();
        let mut dropped_relations = 0;

        for (slot, task) in kept.iter().enumerate() {
            let target = NodeIndex::new(slot);
            for &dep in &task.dependencies {
                if dep == task.id {
                    debug!(task_id = task.id, "task depends on itself");
                    self_dependent.insert(slot);
                    continue;
                }
                match node_id_to_index.get(&NodeId::new(dep)) {
                    Some(&source) => {
                        graph.add_edge(source, target, ());
                        relations.push((source.index(), slot));
                    }
                    None => {
                        debug!(task_id = task.id, dependency = dep, "dropping dangling dependency");
                        dropped_relations += 1;
                    }
                }
            }
        }

        Self {
            graph,
            node_id_to_index,
            tasks: kept,
            relations,
            self_dependent,
            dropped_relations,
            duplicate_tasks,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, slot: usize) -> &Task {
        &self.tasks[slot]
    }

    pub fn node_id(&self, slot: usize) -> NodeId {
        NodeId::new(self.tasks[slot].id)
    }

    pub fn slot_of(&self, id: NodeId) -> Option<usize> {
        self.node_id_to_index.get(&id).map(|index| index.index())
    }

    /// Every resolvable dependency relation in declaration order.
    pub fn relations(&self) -> &[(usize, usize)] {
        &self.relations
    }

    /// Number of dependency ids that referenced unknown tasks.
    pub fn dropped_relations(&self) -> usize {
        self.dropped_relations
    }

    /// Number of tasks dropped because their id was already taken.
    pub fn duplicate_tasks(&self) -> usize {
        self.duplicate_tasks
    }

    fn unique_neighbors(&self, slot: usize, direction: Direction) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(slot), direction)
            .map(|n| n.index())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Slots this task depends on.
    pub fn dependencies(&self, slot: usize) -> Vec<usize> {
        self.unique_neighbors(slot, Direction::Incoming)
    }

    /// Slots depending on this task.
    pub fn dependents(&self, slot: usize) -> Vec<usize> {
        self.unique_neighbors(slot, Direction::Outgoing)
    }

    /// Direct dependencies and dependents combined.
    pub fn neighbors(&self, slot: usize) -> HashSet<usize> {
        self.graph
            .neighbors_undirected(NodeIndex::new(slot))
            .map(|n| n.index())
            .filter(|&n| n != slot)
            .collect()
    }

    /// Number of distinct dependency and dependent connections.
    pub fn connection_count(&self, slot: usize) -> usize {
        self.dependencies(slot).len() + self.dependents(slot).len()
    }

    /// Link degree per slot, counting every relation (used for link bias).
    pub fn degrees(&self) -> Vec<u32> {
        let mut degrees = vec![0u32; self.len()];
        for &(source, target) in &self.relations {
            degrees[source] += 1;
            degrees[target] += 1;
        }
        degrees
    }

    /// Compute dependency levels.
    ///
    /// A task with no resolvable dependencies sits at level 0; otherwise its
    /// level is one more than its deepest dependency. Members of a cycle
    /// (including self-dependencies) are assigned level 0 and act as sources.
    /// Cycles are found with Kosaraju's SCC, then an iterative Kahn pass
    /// assigns the remaining (acyclic) tasks.
    pub fn levels(&self) -> LevelAssignment {
        let n = self.len();
        let mut levels = vec![0u32; n];
        let mut in_cycle = vec![false; n];

        for component in kosaraju_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|node| self.self_dependent.contains(&node.index()));
            if !is_cycle {
                continue;
            }
            let mut ids: Vec<u32> = component
                .iter()
                .map(|node| self.tasks[node.index()].id)
                .collect();
            ids.sort_unstable();
            warn!(tasks = ?ids, "dependency cycle detected, assigning level 0");
            for node in component {
                in_cycle[node.index()] = true;
            }
        }

        let mut pending = vec![0usize; n];
        for &(_, target) in &self.relations {
            if !in_cycle[target] {
                pending[target] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n)
            .filter(|&slot| in_cycle[slot] || pending[slot] == 0)
            .collect();

        while let Some(slot) = queue.pop_front() {
            for next in self
                .graph
                .neighbors_directed(NodeIndex::new(slot), Direction::Outgoing)
            {
                let next = next.index();
                if in_cycle[next] {
                    continue;
                }
                levels[next] = levels[next].max(levels[slot] + 1);
                pending[next] -= 1;
                if pending[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        LevelAssignment {
            levels,
            cycle_members: (0..n).filter(|&slot| in_cycle[slot]).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u32, deps: &[u32]) -> Task {
        Task::new(id, format!("Task {id}")).with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_dangling_dependency_dropped() {
        let graph = TaskGraph::from_tasks(&[task(1, &[]), task(2, &[1, 99])]);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.relations(), &[(0, 1)]);
        assert_eq!(graph.dropped_relations(), 1);
    }

    #[test]
    fn test_duplicate_task_ids_keep_first() {
        let graph = TaskGraph::from_tasks(&[task(1, &[]), task(1, &[]), task(2, &[1])]);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.duplicate_tasks(), 1);
        assert_eq!(graph.slot_of(NodeId(2)), Some(1));
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let graph = TaskGraph::from_tasks(&[task(1, &[]), task(2, &[1]), task(3, &[1, 2, 2])]);
        assert_eq!(graph.dependencies(2), vec![0, 1]);
        assert_eq!(graph.dependents(0), vec![1, 2]);
        assert_eq!(graph.connection_count(1), 2);
        // duplicate relation is kept for bundling
        assert_eq!(graph.relations().len(), 4);
        assert_eq!(graph.degrees(), vec![2, 3, 3]);
    }

    #[test]
    fn test_levels_chain() {
        let graph = TaskGraph::from_tasks(&[task(1, &[]), task(2, &[1]), task(3, &[1, 2])]);
        let levels = graph.levels();
        assert_eq!(levels.levels, vec![0, 1, 2]);
        assert!(levels.cycle_members.is_empty());
        assert_eq!(levels.max_level(), 2);
    }

    #[test]
    fn test_levels_two_cycle_terminates_at_zero() {
        let graph = TaskGraph::from_tasks(&[task(1, &[2]), task(2, &[1])]);
        let levels = graph.levels();
        assert_eq!(levels.levels, vec![0, 0]);
        assert_eq!(levels.cycle_members, vec![0, 1]);
    }

    #[test]
    fn test_levels_dependent_of_cycle() {
        let graph = TaskGraph::from_tasks(&[
            task(1, &[3]),
            task(2, &[1]),
            task(3, &[2]),
            task(4, &[3]),
        ]);
        let levels = graph.levels();
        assert_eq!(levels.levels, vec![0, 0, 0, 1]);
        assert_eq!(levels.cycle_members, vec![0, 1, 2]);
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let graph = TaskGraph::from_tasks(&[task(1, &[1]), task(2, &[1])]);
        assert_eq!(graph.relations(), &[(0, 1)]);
        let levels = graph.levels();
        assert_eq!(levels.levels, vec![0, 1]);
        assert_eq!(levels.cycle_members, vec![0]);
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let tasks: Vec<Task> = (0..5000u32)
            .map(|i| if i == 0 { task(0, &[]) } else { task(i, &[i - 1]) })
            .collect();
        let graph = TaskGraph::from_tasks(&tasks);
        let levels = graph.levels();
        assert_eq!(levels.levels[4999], 4999);
    }
}
