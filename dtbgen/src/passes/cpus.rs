use dtb_parser::{query, Node};
use log::debug;

use super::{cell_list, compatible, display_name, string, Context};
use crate::error::PassError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableMethod {
    Psci,
    SpinTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cpu {
    /// Low-order cell of the cpu's `reg`, i.e. its hardware id.
    pub reg: u32,
    pub enable_method: EnableMethod,
    pub compatible: String,
}

/// One entry per `device_type = "cpu"` node, in document order.
pub fn scan(ctx: &Context) -> Result<Vec<Cpu>, PassError> {
    query::find_by_property_value(ctx.root, "device_type", "cpu")
        .into_iter()
        .map(|m| cpu(m.node))
        .collect()
}

fn cpu(node: &Node) -> Result<Cpu, PassError> {
    let reg = match cell_list(node, "reg")? {
        Some([.., reg]) => *reg,
        _ => {
            return Err(PassError::MissingProperty {
                node: display_name(node),
                property: "reg",
            })
        }
    };

    let enable_method = match string(node, "enable-method")? {
        Some("psci") => EnableMethod::Psci,
        _ => EnableMethod::SpinTable,
    };
    debug!("cpu `{}`: id {reg:#x}, {enable_method:?}", node.name);

    Ok(Cpu {
        reg,
        enable_method,
        compatible: compatible(node)?.unwrap_or_default(),
    })
}
