//! Dependency graph between the resources of one stack.
//!
//! - Forward edges: resource -> resources it depends on
//! - Reverse edges: resource -> resources that require it (`required_by`)

use crate::error::{Result, StackError};
use std::collections::{BTreeSet, HashMap};

pub struct DependencyGraph {
    /// Resource names in declaration order; used to break ties.
    nodes: Vec<String>,
    edges: HashMap<String, BTreeSet<String>>,
    reverse_edges: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: HashMap::new(),
            reverse_edges: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.nodes.contains(&name) {
            self.nodes.push(name);
        }
    }

    /// `resource` depends on `depends_on`: it is created after and deleted
    /// before it.
    pub fn add_dependency(&mut self, resource: &str, depends_on: &str) -> Result<()> {
        for n in [resource, depends_on] {
            if !self.nodes.iter().any(|x| x == n) {
                return Err(StackError::InvalidTemplate(format!(
                    "resource '{resource}' depends on unknown resource '{depends_on}'"
                )));
            }
        }
        self.edges
            .entry(resource.to_string())
            .or_default()
            .insert(depends_on.to_string());
        self.reverse_edges
            .entry(depends_on.to_string())
            .or_default()
            .insert(resource.to_string());
        Ok(())
    }

    pub fn dependencies(&self, resource: &str) -> Vec<String> {
        self.edges
            .get(resource)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of the resources that depend on `resource`, sorted.
    pub fn required_by(&self, resource: &str) -> Vec<String> {
        self.reverse_edges
            .get(resource)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Creation order (Kahn's algorithm). Among resources whose dependencies
    /// are satisfied the earliest declared goes first.
    pub fn order(&self) -> Result<Vec<String>> {
        let mut remaining: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.edges.get(n).map(|d| d.len()).unwrap_or(0)))
            .collect();
        let mut ordered = Vec::with_capacity(self.nodes.len());

        while ordered.len() < self.nodes.len() {
            let Some(next) = self
                .nodes
                .iter()
                .find(|n| remaining.get(n.as_str()) == Some(&0))
            else {
                let stuck = self
                    .nodes
                    .iter()
                    .find(|n| remaining.contains_key(n.as_str()))
                    .cloned()
                    .unwrap_or_default();
                return Err(StackError::CircularDependency(stuck));
            };
            remaining.remove(next.as_str());
            if let Some(waiting) = self.reverse_edges.get(next) {
                for w in waiting {
                    if let Some(count) = remaining.get_mut(w.as_str()) {
                        *count -= 1;
                    }
                }
            }
            ordered.push(next.clone());
        }

        Ok(ordered)
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&str], deps: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.add_node(*n);
        }
        for (a, b) in deps {
            g.add_dependency(a, b).unwrap();
        }
        g
    }

    #[test]
    fn order_respects_dependencies() {
        let g = graph(&["web", "db", "net"], &[("web", "db"), ("db", "net")]);
        assert_eq!(g.order().unwrap(), vec!["net", "db", "web"]);
    }

    #[test]
    fn independent_resources_keep_declaration_order() {
        let g = graph(&["c", "a", "b"], &[]);
        assert_eq!(g.order().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn required_by_is_reverse_of_depends_on() {
        let g = graph(&["web", "worker", "db"], &[("web", "db"), ("worker", "db")]);
        assert_eq!(g.required_by("db"), vec!["web", "worker"]);
        assert!(g.required_by("web").is_empty());
        assert_eq!(g.dependencies("web"), vec!["db"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        assert!(matches!(g.order(), Err(StackError::CircularDependency(_))));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let mut g = DependencyGraph::new();
        g.add_node("a");
        assert!(matches!(
            g.add_dependency("a", "ghost"),
            Err(StackError::InvalidTemplate(_))
        ));
    }
}
