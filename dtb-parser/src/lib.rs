//! Decoding of flattened device tree blobs (`.dtb`) into an owned node tree,
//! plus the queries needed to pull hardware descriptions out of it.
//!
//! ```no_run
//! use dtb_parser::{cells, query};
//!
//! let blob = std::fs::read("virt.dtb")?;
//! let fdt = dtb_parser::from_bytes(&blob)?;
//! for m in query::find_by_property_value(&fdt.root, "device_type", "memory") {
//!     for (base, size) in cells::decode_reg(m.node, m.geometry)? {
//!         println!("{}: {base:#x} + {size:#x}", m.node.name);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cells;
pub mod geometry;
mod parser;
pub mod query;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod tree;

pub use geometry::Geometry;
pub use parser::{from_bytes, total_size, DecodeError, Header, FDT_MAGIC, HEADER_SIZE};
pub use tree::{Fdt, Node, Property, PropertyValue, Reservation};
