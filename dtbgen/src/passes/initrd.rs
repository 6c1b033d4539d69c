use dtb_parser::{cells, cells::CellError, Node};
use log::debug;

use super::{cell_list, Context};
use crate::error::PassError;

/// Physical bounds of the initial ramdisk; a missing bound is 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Initrd {
    pub start: u64,
    pub end: u64,
}

pub fn scan(ctx: &Context) -> Result<Initrd, PassError> {
    let chosen = match ctx.top_level("chosen") {
        Some(chosen) => chosen.node,
        None => {
            debug!("no /chosen node, initrd bounds default to 0");
            return Ok(Initrd::default());
        }
    };

    Ok(Initrd {
        start: bound(chosen, "linux,initrd-start")?,
        end: bound(chosen, "linux,initrd-end")?,
    })
}

/// An initrd bound of one or two cells.
fn bound(chosen: &Node, property: &'static str) -> Result<u64, PassError> {
    match cell_list(chosen, property)? {
        None => Ok(0),
        Some(bound) if (1..=2).contains(&bound.len()) => Ok(cells::combine(bound)),
        Some(bound) => Err(CellError::UnsupportedWidth {
            what: "initrd bound",
            width: bound.len() as u32,
        }
        .into()),
    }
}
