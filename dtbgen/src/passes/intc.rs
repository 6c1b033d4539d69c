use dtb_parser::query;
use log::debug;

use super::{compatible, display_name, Context, Region};
use crate::error::PassError;

/// The interrupt controller named by the root's `interrupt-parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptController {
    pub dist_base: Region,
    pub cpu_base: Region,
    pub compatible: String,
    /// Width of the interrupt specifiers of devices routed to it.
    pub interrupt_cells: u32,
}

pub fn scan(ctx: &Context) -> Result<InterruptController, PassError> {
    let root = ctx.root;
    let phandle = match root.value("interrupt-parent") {
        None => {
            return Err(PassError::MissingMandatoryNode(
                "the root node has no `interrupt-parent`".into(),
            ))
        }
        Some(value) => value.as_u32().ok_or_else(|| PassError::UnexpectedValue {
            node: display_name(root),
            property: "interrupt-parent",
            expected: "a phandle",
            found: value.kind(),
        })?,
    };

    let parent = query::find_by_property(root, "phandle")
        .into_iter()
        .find(|m| m.property.value.as_u32() == Some(phandle))
        .ok_or_else(|| {
            PassError::MissingMandatoryNode(format!("no node has phandle {phandle:#x}"))
        })?;
    let node = parent.node;
    debug!("interrupt parent {phandle:#x} is `{}`", node.name);

    let interrupt_cells = match node.value("#interrupt-cells") {
        None => {
            return Err(PassError::MissingMandatoryNode(format!(
                "interrupt parent `{}` declares no `#interrupt-cells`",
                node.name
            )))
        }
        Some(value) => value.as_u32().ok_or_else(|| PassError::UnexpectedValue {
            node: display_name(node),
            property: "#interrupt-cells",
            expected: "a single cell",
            found: value.kind(),
        })?,
    };
    if !node.has_property("interrupt-controller") {
        return Err(PassError::MissingMandatoryNode(format!(
            "interrupt parent `{}` is not an `interrupt-controller`",
            node.name
        )));
    }

    let [dist_base, cpu_base]: [Region; 2] = ctx
        .regions(node, parent.geometry)?
        .try_into()
        .map_err(|regions: Vec<Region>| PassError::RegionCount {
            node: display_name(node),
            expected: 2,
            found: regions.len(),
        })?;

    Ok(InterruptController {
        dist_base,
        cpu_base,
        compatible: compatible(node)?.unwrap_or_default(),
        interrupt_cells,
    })
}
