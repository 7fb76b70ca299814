//! Cycle detection over an adjacency map.

use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

/// Find cycles with an iterative depth-first search.
///
/// Every back-edge to a node on the current path yields the set of nodes
/// from that node to the top of the path. Identical sets are reported once.
/// Nodes are visited in key order, so the result is deterministic.
pub fn find_cycles(edges: &BTreeMap<String, BTreeSet<String>>) -> Vec<BTreeSet<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut found: BTreeSet<BTreeSet<String>> = BTreeSet::new();

    for root in edges.keys() {
        if marks.contains_key(root.as_str()) {
            continue;
        }

        // (node, its successors, index of the next successor to visit)
        let mut stack: Vec<(&str, Vec<&str>, usize)> =
            vec![(root.as_str(), successors(edges, root), 0)];
        marks.insert(root.as_str(), Mark::OnStack);

        while let Some((node, next_nodes, cursor)) = stack.last_mut() {
            let node: &str = *node;
            let Some(&next) = next_nodes.get(*cursor) else {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            };
            *cursor += 1;

            match marks.get(next) {
                Some(Mark::OnStack) => {
                    if let Some(start) = stack.iter().position(|(n, _, _)| *n == next) {
                        let cycle = stack[start..]
                            .iter()
                            .map(|(n, _, _)| n.to_string())
                            .collect();
                        found.insert(cycle);
                    }
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(next, Mark::OnStack);
                    stack.push((next, successors(edges, next), 0));
                }
            }
        }
    }

    found.into_iter().collect()
}

fn successors<'a>(edges: &'a BTreeMap<String, BTreeSet<String>>, node: &str) -> Vec<&'a str> {
    edges
        .get(node)
        .map(|targets| targets.iter().map(String::as_str).collect())
        .unwrap_or_default()
}
