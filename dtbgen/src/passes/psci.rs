use dtb_parser::{cells::CellError, Node};
use log::{debug, warn};

use super::{cell_list, compatible, string, Context};
use crate::error::PassError;

/// PSCI conduit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsciMethod {
    Hvc,
    Smc,
}

/// The `/psci` node. Absent function ids are left out of the output, as
/// are malformed ones unless running strict.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Psci {
    pub migrate: Option<u32>,
    pub cpu_on: Option<u32>,
    pub cpu_off: Option<u32>,
    pub cpu_suspend: Option<u32>,
    pub method: Option<PsciMethod>,
    pub compatible: Option<String>,
}

/// A present node always yields a descriptor.
pub fn scan(ctx: &Context, strict: bool) -> Result<Option<Psci>, PassError> {
    let node = match ctx.top_level("psci") {
        Some(psci) => psci.node,
        None => {
            debug!("no /psci node");
            return Ok(None);
        }
    };

    let id_of = |property: &'static str| match function_id(node, property) {
        Err(err) if err.is_pass_local() && !strict => {
            warn!("psci: {property}: {err}; leaving it out");
            Ok(None)
        }
        id => id,
    };

    Ok(Some(Psci {
        migrate: id_of("migrate")?,
        cpu_on: id_of("cpu_on")?,
        cpu_off: id_of("cpu_off")?,
        cpu_suspend: id_of("cpu_suspend")?,
        method: string(node, "method")?.map(|method| match method {
            "hvc" => PsciMethod::Hvc,
            _ => PsciMethod::Smc,
        }),
        compatible: compatible(node)?,
    }))
}

fn function_id(node: &Node, property: &'static str) -> Result<Option<u32>, PassError> {
    match cell_list(node, property)? {
        None => Ok(None),
        Some([id]) => Ok(Some(*id)),
        Some(id) => Err(CellError::UnsupportedWidth {
            what: "PSCI function id",
            width: id.len() as u32,
        }
        .into()),
    }
}
