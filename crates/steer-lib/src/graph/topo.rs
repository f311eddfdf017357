//! Topological ordering with cycle rejection

use super::DependencyGraph;
use crate::error::{Result, SteerError};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Walk<'g> {
    graph: &'g DependencyGraph,
    marks: Vec<Mark>,
    path: Vec<usize>,
    postorder: Vec<usize>,
}

impl<'g> Walk<'g> {
    fn visit(&mut self, node: usize) -> Result<()> {
        self.marks[node] = Mark::InProgress;
        self.path.push(node);

        for child in self.graph.sorted_children(node) {
            match self.marks[child] {
                Mark::Unvisited => self.visit(child)?,
                Mark::InProgress => return Err(self.cycle_error(child)),
                Mark::Done => {}
            }
        }

        self.path.pop();
        self.marks[node] = Mark::Done;
        self.postorder.push(node);
        Ok(())
    }

    fn cycle_error(&self, reentered: usize) -> SteerError {
        let start = self
            .path
            .iter()
            .position(|&n| n == reentered)
            .unwrap_or(0);
        let mut path: Vec<String> = self.path[start..]
            .iter()
            .map(|&n| self.graph.names[n].clone())
            .collect();
        path.push(self.graph.names[reentered].clone());

        SteerError::CyclicGraph {
            component: self.graph.names[reentered].clone(),
            path,
        }
    }
}

impl DependencyGraph {
    fn sorted_children(&self, node: usize) -> Vec<usize> {
        let mut children: Vec<usize> = self.successors[node].iter().copied().collect();
        children.sort_by(|a, b| self.names[*a].cmp(&self.names[*b]));
        children
    }

    /// Order components so every edge points from an earlier to a later one
    ///
    /// DFS roots are taken in ascending name order, so the result is stable
    /// for a given graph. A cycle is rejected with [`SteerError::CyclicGraph`].
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut roots: Vec<usize> = (0..self.names.len()).collect();
        roots.sort_by(|a, b| self.names[*a].cmp(&self.names[*b]));

        let mut walk = Walk {
            graph: self,
            marks: vec![Mark::Unvisited; self.names.len()],
            path: Vec::new(),
            postorder: Vec::with_capacity(self.names.len()),
        };

        for root in roots {
            if walk.marks[root] == Mark::Unvisited {
                walk.visit(root)?;
            }
        }

        Ok(walk
            .postorder
            .into_iter()
            .rev()
            .map(|n| self.names[n].clone())
            .collect())
    }

    /// True if the graph has no directed cycle
    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_ok()
    }
}
