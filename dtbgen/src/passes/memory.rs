use dtb_parser::query;
use log::debug;

use super::{Context, Region};
use crate::error::PassError;

/// Usable memory: every region of every `device_type = "memory"` node.
pub fn scan(ctx: &Context) -> Result<Vec<Region>, PassError> {
    let mut regions = Vec::new();

    for m in query::find_by_property_value(ctx.root, "device_type", "memory") {
        let found = ctx.regions(m.node, m.geometry)?;
        debug!("memory node `{}`: {} regions", m.node.name, found.len());
        regions.extend(found);
    }

    Ok(regions)
}
