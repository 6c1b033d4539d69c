//! Depth-first searches over a device tree.
//!
//! Every search walks the tree in document order (a node before its
//! children, children in declaration order) and threads the geometry in
//! force down from the root, so each result knows the cell widths its own
//! `reg` is expressed in.

use crate::geometry::Geometry;
use crate::tree::{Node, Property};

/// A node together with the geometry in force for it, i.e. the cell widths
/// declared by its nearest ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoped<'a> {
    pub node: &'a Node,
    pub geometry: Geometry,
}

impl<'a> Scoped<'a> {
    /// The root node, governed by the default geometry.
    pub fn root(root: &'a Node) -> Self {
        Self {
            node: root,
            geometry: Geometry::default(),
        }
    }

    /// Look up a direct child by full or base name.
    pub fn child(&self, name: &str) -> Option<Scoped<'a>> {
        self.node.child(name).map(|node| Scoped {
            node,
            geometry: self.geometry.enter(self.node),
        })
    }

    pub fn children(&self) -> impl Iterator<Item = Scoped<'a>> + 'a {
        let geometry = self.geometry.enter(self.node);
        self.node
            .children
            .iter()
            .map(move |node| Scoped { node, geometry })
    }
}

/// A node found by a property search, along with the matching property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub node: &'a Node,
    pub property: &'a Property,
    pub geometry: Geometry,
}

/// Collect every node of the tree rooted at `root` that satisfies `predicate`.
pub fn find_nodes<'a, F>(root: &'a Node, predicate: F) -> Vec<Scoped<'a>>
where
    F: Fn(&Node) -> bool,
{
    search(Scoped::root(root), &|scoped| {
        predicate(scoped.node).then_some(scoped)
    })
}

/// Collect every node that has a property literally named `key`.
pub fn find_by_property<'a>(root: &'a Node, key: &str) -> Vec<Match<'a>> {
    search(Scoped::root(root), &|scoped| {
        scoped.node.property(key).map(|property| Match {
            node: scoped.node,
            property,
            geometry: scoped.geometry,
        })
    })
}

/// Collect every node whose `key` property is the string `value`, or a
/// string list containing it.
pub fn find_by_property_value<'a>(root: &'a Node, key: &str, value: &str) -> Vec<Match<'a>> {
    find_by_property(root, key)
        .into_iter()
        .filter(|m| {
            m.property
                .value
                .as_strings()
                .map_or(false, |strings| strings.contains(&value))
        })
        .collect()
}

fn search<'a, T, F>(scoped: Scoped<'a>, visit: &F) -> Vec<T>
where
    F: Fn(Scoped<'a>) -> Option<T>,
{
    visit(scoped)
        .into_iter()
        .chain(scoped.children().flat_map(|child| search(child, visit)))
        .collect()
}
