//! Compiles a flattened device tree blob into a C header of statically
//! initialized tables for early boot code.
//!
//! The blob is decoded with [`dtb_parser`], each category of hardware is
//! pulled out by one extraction pass, and the resulting tables are rendered
//! in a fixed schema.

use log::info;

pub mod config;
pub mod emit;
pub mod error;
pub mod logger;
pub mod passes;

pub use config::{Config, GeometryMode};
pub use error::{CompileError, EmitError, Pass, PassError};

/// Compile `blob` into the text of the generated header.
pub fn compile(blob: &[u8], config: &Config) -> Result<String, CompileError> {
    let fdt = dtb_parser::from_bytes(blob)?;
    let tables = passes::extract(&fdt, config)?;

    info!(
        "{}: {} memory, {} reserved regions, {} cpus, console {}, psci {}, timer {}",
        tables.machine_name,
        tables.memory.len(),
        tables.reserved.len(),
        tables.cpus.len(),
        if tables.console.is_some() { "yes" } else { "no" },
        if tables.psci.is_some() { "yes" } else { "no" },
        if tables.timer.is_some() { "yes" } else { "no" },
    );

    Ok(emit::render(&tables)?)
}
