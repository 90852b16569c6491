//! Build ordering
//!
//! Specs are grouped into batches; every spec in a batch only depends on
//! specs from earlier batches.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::base::BaseImage;
use crate::spec::ImageSpec;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct Node<T> {
    pub name: String,
    pub value: T,
    pub depends: BTreeSet<String>,
}

impl<T> Node<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value,
            depends: BTreeSet::new(),
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends.insert(name.into());
        self
    }
}

/// Group nodes into batches that can be built together.
///
/// Dependencies on names that are not part of `nodes` are already
/// satisfied. Batches, and nodes within a batch, are ordered by name.
pub fn get_batches<T>(nodes: Vec<Node<T>>) -> Result<Vec<Vec<Node<T>>>> {
    let known: BTreeSet<String> = nodes.iter().map(|n| n.name.clone()).collect();

    let mut pending: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut by_name: HashMap<String, Node<T>> = HashMap::new();
    for node in nodes {
        let deps = node
            .depends
            .iter()
            .filter(|d| known.contains(*d) && **d != node.name)
            .cloned()
            .collect();
        pending.insert(node.name.clone(), deps);
        by_name.insert(node.name.clone(), node);
    }

    let mut batches = Vec::new();
    while !pending.is_empty() {
        let ready: Vec<String> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.clone())
            .collect();

        if ready.is_empty() {
            return Err(Error::CircularDependency(format_dependencies(&pending)));
        }

        for name in &ready {
            pending.remove(name);
        }
        for deps in pending.values_mut() {
            for name in &ready {
                deps.remove(name);
            }
        }

        debug!("Batch {}: {}", batches.len() + 1, ready.join(", "));
        batches.push(
            ready
                .iter()
                .filter_map(|name| by_name.remove(name))
                .collect(),
        );
    }

    Ok(batches)
}

fn format_dependencies(deps: &BTreeMap<String, BTreeSet<String>>) -> String {
    deps.iter()
        .flat_map(|(name, parents)| parents.iter().map(move |p| format!("{} -> {}", name, p)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Order specs so a layered image is built after the spec it sits on.
///
/// A `layer:` base that names another spec, by id or by `name` prop, is a
/// dependency on that spec; any other base is an existing image.
pub fn plan_builds(specs: Vec<ImageSpec>) -> Result<Vec<Vec<ImageSpec>>> {
    let mut ids_by_name: HashMap<String, String> = HashMap::new();
    for spec in &specs {
        ids_by_name.insert(spec.id.clone(), spec.id.clone());
        ids_by_name
            .entry(spec.name().to_string())
            .or_insert_with(|| spec.id.clone());
    }

    let mut nodes = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut node = Node::new(spec.id.clone(), spec);
        if let Ok(BaseImage::Layer(parent)) = node.value.base() {
            if let Some(parent_id) = ids_by_name.get(&parent) {
                node = node.depends_on(parent_id.clone());
            }
        }
        nodes.push(node);
    }

    Ok(get_batches(nodes)?
        .into_iter()
        .map(|batch| batch.into_iter().map(|node| node.value).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names<T>(batches: &[Vec<Node<T>>]) -> Vec<Vec<&str>> {
        batches
            .iter()
            .map(|b| b.iter().map(|n| n.name.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_batches_follow_dependencies() {
        let nodes = vec![
            Node::new("c", ()).depends_on("b"),
            Node::new("b", ()).depends_on("a"),
            Node::new("a", ()),
            Node::new("d", ()).depends_on("a"),
        ];
        let batches = get_batches(nodes).unwrap();
        assert_eq!(names(&batches), vec![vec!["a"], vec!["b", "d"], vec!["c"]]);
    }

    #[test]
    fn test_unknown_dependencies_are_satisfied() {
        let nodes = vec![Node::new("a", ()).depends_on("libguestfs:fedora-23")];
        let batches = get_batches(nodes).unwrap();
        assert_eq!(names(&batches), vec![vec!["a"]]);
    }

    #[test]
    fn test_cycle_reports_edges() {
        let nodes = vec![
            Node::new("a", ()).depends_on("b"),
            Node::new("b", ()).depends_on("a"),
            Node::new("c", ()),
        ];
        match get_batches(nodes) {
            Err(Error::CircularDependency(msg)) => assert_eq!(msg, "a -> b\nb -> a"),
            other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_plan_builds_orders_layers() {
        let specs = vec![
            ImageSpec::parse("/s/el7-app", "#name=el7-app\n#base=layer:el7-base\n"),
            ImageSpec::parse("/s/base.spec", "#name=el7-base\n#base=libguestfs:centos-7.2\n"),
            ImageSpec::parse("/s/fc23", "#name=fc23\n#base=layer:/images/fc23.qcow2\n"),
        ];
        let batches = plan_builds(specs).unwrap();
        let ids: Vec<Vec<&str>> = batches
            .iter()
            .map(|b| b.iter().map(|s| s.id.as_str()).collect())
            .collect();
        assert_eq!(ids, vec![vec!["base.spec", "fc23"], vec!["el7-app"]]);
    }
}
