use std::slice;

use log::debug;

use super::{string, Context, Region, RegionFlags};
use crate::error::PassError;

/// Reserved regions, always terminated by an all-zero sentinel region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedRegions(Vec<Region>);

impl ReservedRegions {
    pub fn new(mut regions: Vec<Region>) -> Self {
        regions.push(Region::default());
        Self(regions)
    }

    /// The regions, sentinel included.
    pub fn iter(&self) -> slice::Iter<'_, Region> {
        self.0.iter()
    }

    /// The number of regions, sentinel excluded.
    pub fn len(&self) -> usize {
        self.0.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReservedRegions {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// The header's memory reservation entries, followed by the enabled
/// children of `/reserved-memory` that have a static `reg`.
pub fn scan(ctx: &Context) -> Result<ReservedRegions, PassError> {
    let mut regions: Vec<_> = ctx
        .fdt
        .reservations
        .iter()
        .map(|r| Region::new(r.address, r.size))
        .collect();

    if let Some(reserved) = ctx.top_level("reserved-memory") {
        for child in reserved.children() {
            let node = child.node;

            if let Some(status) = string(node, "status")? {
                if status != "ok" && status != "okay" {
                    debug!("reserved region `{}` is {status}, skipping", node.name);
                    continue;
                }
            }

            let flags = if node.has_property("no-map") {
                RegionFlags::NO_MAP
            } else {
                RegionFlags::empty()
            };

            let found = ctx.regions(node, child.geometry)?;
            if found.is_empty() {
                debug!("reserved region `{}` has no static `reg`, skipping", node.name);
            }
            regions.extend(found.into_iter().map(|r| Region { flags, ..r }));
        }
    }

    Ok(ReservedRegions::new(regions))
}

#[cfg(test)]
mod tests {
    use dtb_parser::testing::BlobBuilder;

    use super::*;
    use crate::config::GeometryMode;
    use crate::passes::decode;

    fn scan_blob(builder: BlobBuilder) -> Vec<Region> {
        let fdt = decode(builder);
        scan(&Context::new(&fdt, GeometryMode::Scoped))
            .unwrap()
            .iter()
            .copied()
            .collect()
    }

    fn reserved_memory() -> BlobBuilder {
        BlobBuilder::new()
            .begin_node("")
            .begin_node("reserved-memory")
            .prop_cells("#address-cells", &[1])
            .prop_cells("#size-cells", &[1])
    }

    fn no_map(base: u64, size: u64) -> Region {
        Region {
            flags: RegionFlags::NO_MAP,
            ..Region::new(base, size)
        }
    }

    #[test]
    fn sentinel_only() {
        let regions = scan_blob(BlobBuilder::new().begin_node("").end_node());
        assert_eq!(regions, [Region::default()]);

        assert!(ReservedRegions::default().is_empty());
        assert_eq!(ReservedRegions::default().iter().count(), 1);
    }

    #[test]
    fn header_reservations_come_first() {
        let builder = reserved_memory()
            .begin_node("secmon@5e000000")
            .prop_cells("reg", &[0x5e00_0000, 0x20_0000])
            .prop_empty("no-map")
            .end_node()
            .end_node()
            .end_node()
            .reserve(0x4800_0000, 0x1000);

        assert_eq!(
            scan_blob(builder),
            [
                Region::new(0x4800_0000, 0x1000),
                no_map(0x5e00_0000, 0x20_0000),
                Region::default(),
            ]
        );
    }

    #[test]
    fn status_and_missing_reg() {
        let builder = reserved_memory()
            .begin_node("disabled@50000000")
            .prop_str("status", "disabled")
            .prop_cells("reg", &[0x5000_0000, 0x1000])
            .end_node()
            .begin_node("okay@51000000")
            .prop_str("status", "okay")
            .prop_cells("reg", &[0x5100_0000, 0x1000, 0x5200_0000, 0x1000])
            .end_node()
            .begin_node("ok@53000000")
            .prop_str("status", "ok")
            .prop_cells("reg", &[0x5300_0000, 0x1000])
            .end_node()
            .begin_node("linux,cma")
            .prop_str("compatible", "shared-dma-pool")
            .prop_cells("size", &[0x0, 0x400_0000])
            .prop_empty("reusable")
            .end_node()
            .end_node()
            .end_node();

        assert_eq!(
            scan_blob(builder),
            [
                Region::new(0x5100_0000, 0x1000),
                Region::new(0x5200_0000, 0x1000),
                Region::new(0x5300_0000, 0x1000),
                Region::default(),
            ]
        );
    }
}
