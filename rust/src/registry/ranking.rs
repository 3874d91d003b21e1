//! Rank assignment over the component dependency graph.
//!
//! Ranks are the smallest non-negative integers with `rank(u) < rank(v)` for
//! every edge "v depends on u", i.e. the longest dependency chain ending at
//! each node.

use std::collections::VecDeque;

/// The dependency graph contains a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// Nodes on a cycle or downstream of one, in ascending index order.
    pub unordered: Vec<usize>,
}

/// Compute ranks by repeated relaxation.
///
/// `dependencies[v]` lists the nodes `v` depends on; every index must be in
/// range. A fixed point is reached within `n` passes on an acyclic graph, so a
/// change on pass `n + 1` proves a cycle. Nothing is returned on failure.
pub fn compute_ranks(dependencies: &[Vec<usize>]) -> Result<Vec<u32>, CycleError> {
    let n = dependencies.len();
    let mut ranks = vec![0u32; n];

    for _pass in 0..=n {
        let mut changed = false;
        for (v, deps) in dependencies.iter().enumerate() {
            for &u in deps {
                if ranks[v] <= ranks[u] {
                    ranks[v] = ranks[u] + 1;
                    changed = true;
                }
            }
        }
        if !changed {
            return Ok(ranks);
        }
    }

    Err(CycleError {
        unordered: unordered_nodes(dependencies),
    })
}

/// Nodes Kahn's algorithm cannot release: those on or behind a cycle.
fn unordered_nodes(dependencies: &[Vec<usize>]) -> Vec<usize> {
    let n = dependencies.len();
    let mut in_degree: Vec<usize> = dependencies.iter().map(|deps| deps.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (v, deps) in dependencies.iter().enumerate() {
        for &u in deps {
            dependents[u].push(v);
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&v| in_degree[v] == 0).collect();
    while let Some(u) = queue.pop_front() {
        for &v in &dependents[u] {
            in_degree[v] -= 1;
            if in_degree[v] == 0 {
                queue.push_back(v);
            }
        }
    }

    (0..n).filter(|&v| in_degree[v] > 0).collect()
}
