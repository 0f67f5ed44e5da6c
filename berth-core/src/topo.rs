//! Topological ordering for named nodes with `depends_on` edges.

use std::collections::{HashMap, HashSet, VecDeque};

/// Order `nodes` so that every node comes after the nodes it depends on.
///
/// `nodes` is a list of `(name, depends_on)` pairs. Dependencies naming nodes
/// outside the list are ignored. Ties are broken by declaration order, so the
/// result is deterministic. Returns indices into `nodes`.
///
/// On a cycle, returns the name of a node that lies on it.
pub fn topological_order<S: AsRef<str>>(nodes: &[(S, Vec<S>)]) -> Result<Vec<usize>, String> {
    let index: HashMap<&str, usize> =
        nodes.iter().enumerate().map(|(i, (name, _))| (name.as_ref(), i)).collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut deps: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for (i, (_, depends_on)) in nodes.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in depends_on {
            if let Some(&d) = index.get(dep.as_ref()) {
                if seen.insert(d) {
                    dependents[d].push(i);
                    deps[i].push(d);
                    in_degree[i] += 1;
                }
            }
        }
    }

    // Kahn's algorithm
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &next in &dependents[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() == nodes.len() {
        return Ok(order);
    }

    // Every unsorted node still has an unsorted dependency; walking those edges
    // must revisit a node, and that node is on a cycle.
    let mut current = (0..nodes.len()).find(|&i| in_degree[i] > 0).unwrap_or(0);
    let mut visited = HashSet::new();
    while visited.insert(current) {
        match deps[current].iter().find(|&&d| in_degree[d] > 0) {
            Some(&d) => current = d,
            None => break,
        }
    }
    Err(nodes[current].0.as_ref().to_string())
}
