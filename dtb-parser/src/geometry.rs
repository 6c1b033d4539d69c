use log::warn;

use crate::tree::Node;

/// The cell widths that govern how `reg` and `interrupts` values are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub address_cells: u32,
    pub size_cells: u32,
    pub interrupt_cells: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            address_cells: 2,
            size_cells: 2,
            interrupt_cells: 0,
        }
    }
}

impl Geometry {
    /// Document-wide geometry: the `#address-cells` and `#size-cells` of the
    /// root node, or the defaults where the root declares none.
    pub fn resolve(root: &Node) -> Self {
        let defaults = Self::default();

        Self {
            address_cells: declared(root, "#address-cells").unwrap_or(defaults.address_cells),
            size_cells: declared(root, "#size-cells").unwrap_or(defaults.size_cells),
            ..defaults
        }
    }

    /// The geometry in force for the children of `node`, given the geometry
    /// in force for `node` itself.
    pub fn enter(self, node: &Node) -> Self {
        Self {
            address_cells: declared(node, "#address-cells").unwrap_or(self.address_cells),
            size_cells: declared(node, "#size-cells").unwrap_or(self.size_cells),
            interrupt_cells: declared(node, "#interrupt-cells").unwrap_or(self.interrupt_cells),
        }
    }
}

/// A single-cell width property of `node`, if it declares a usable one.
fn declared(node: &Node, name: &str) -> Option<u32> {
    let value = node.value(name)?;
    let width = value.as_u32();
    if width.is_none() {
        warn!(
            "ignoring `{name}` of node `{}`: expected a single cell, found {}",
            node.name,
            value.kind()
        );
    }
    width
}
