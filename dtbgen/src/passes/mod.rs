//! Extraction passes: each one queries the decoded tree for one category of
//! hardware and builds the descriptor the emitter renders.
//!
//! Passes are independent of each other. Only the interrupt controller is
//! mandatory; every other pass yields an empty or default descriptor when its
//! nodes are absent.

use bitflags::bitflags;
use dtb_parser::{cells, query::Scoped, Fdt, Geometry, Node};
use log::{debug, warn};

use crate::config::{Config, GeometryMode};
use crate::error::{CompileError, Pass, PassError};

pub mod console;
pub mod cpus;
pub mod initrd;
pub mod intc;
pub mod memory;
pub mod psci;
pub mod reserved;
pub mod timer;

pub use console::Console;
pub use cpus::{Cpu, EnableMethod};
pub use initrd::Initrd;
pub use intc::InterruptController;
pub use psci::{Psci, PsciMethod};
pub use reserved::ReservedRegions;
pub use timer::{InterruptSpecifier, Timer};

bitflags! {
    #[derive(Default)]
    pub struct RegionFlags: u32 {
        /// The region must not be mapped by the boot code.
        const NO_MAP = 1;
    }
}

/// A physical memory region decoded from a `reg` property.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: u64,
    pub size: u64,
    pub flags: RegionFlags,
}

impl Region {
    pub fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            size,
            flags: RegionFlags::empty(),
        }
    }
}

/// Every table of the generated header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub total_size: u32,
    pub machine_name: String,
    pub initrd: Initrd,
    pub memory: Vec<Region>,
    pub reserved: ReservedRegions,
    pub console: Option<Console>,
    /// `None` when the tree has no `psci` node.
    pub psci: Option<Psci>,
    pub cpus: Vec<Cpu>,
    pub interrupt_controller: InterruptController,
    pub timer: Option<Timer>,
}

/// Run every pass over `fdt`, in output order.
pub fn extract(fdt: &Fdt, config: &Config) -> Result<Tables, CompileError> {
    let ctx = Context::new(fdt, config.geometry);

    let initrd = initrd::scan(&ctx).or_else(|err| tolerate(Pass::Initrd, config, err))?;
    let memory = memory::scan(&ctx).or_else(|err| tolerate(Pass::Memory, config, err))?;
    let reserved =
        reserved::scan(&ctx).or_else(|err| tolerate(Pass::ReservedMemory, config, err))?;
    let console = console::scan(&ctx).or_else(|err| tolerate(Pass::Console, config, err))?;
    let psci = psci::scan(&ctx, config.strict).map_err(|source| CompileError::Pass {
        pass: Pass::Psci,
        source,
    })?;
    let cpus = cpus::scan(&ctx).or_else(|err| tolerate(Pass::Cpus, config, err))?;
    let interrupt_controller = intc::scan(&ctx).map_err(|source| CompileError::Pass {
        pass: Pass::InterruptController,
        source,
    })?;
    let timer = timer::scan(&ctx, interrupt_controller.interrupt_cells)
        .or_else(|err| tolerate(Pass::Timer, config, err))?;

    Ok(Tables {
        total_size: fdt.total_size(),
        machine_name: machine_name(&fdt.root)?,
        initrd,
        memory,
        reserved,
        console,
        psci,
        cpus,
        interrupt_controller,
        timer,
    })
}

/// Turn a pass-local failure of an optional pass into its default table,
/// unless running strict.
fn tolerate<T: Default>(pass: Pass, config: &Config, err: PassError) -> Result<T, CompileError> {
    if err.is_pass_local() && !config.strict {
        warn!("{pass} pass: {err}; emitting its default table");
        Ok(T::default())
    } else {
        Err(CompileError::Pass { pass, source: err })
    }
}

/// The `model` of the root, else its first `compatible`, else `Unknown`.
fn machine_name(root: &Node) -> Result<String, CompileError> {
    let model = string(root, "model")
        .and_then(|model| match model {
            Some(model) => Ok(Some(model.to_owned())),
            None => first_compatible(root),
        })
        .map_err(|source| CompileError::Pass {
            pass: Pass::MachineName,
            source,
        });

    Ok(model?.unwrap_or_else(|| "Unknown".to_owned()))
}

fn first_compatible(node: &Node) -> Result<Option<String>, PassError> {
    Ok(strings(node, "compatible")?.and_then(|list| list.first().map(|s| s.to_string())))
}

/// Shared state of one extraction run.
pub struct Context<'a> {
    pub fdt: &'a Fdt,
    pub root: &'a Node,
    mode: GeometryMode,
    root_geometry: Geometry,
}

impl<'a> Context<'a> {
    pub fn new(fdt: &'a Fdt, mode: GeometryMode) -> Self {
        let root_geometry = Geometry::resolve(&fdt.root);
        debug!(
            "root geometry: {} address cells, {} size cells, {mode:?} mode",
            root_geometry.address_cells, root_geometry.size_cells
        );

        Self {
            fdt,
            root: &fdt.root,
            mode,
            root_geometry,
        }
    }

    /// A direct child of the root, looked up by full or base name.
    pub fn top_level(&self, name: &str) -> Option<Scoped<'a>> {
        Scoped::root(self.root).child(name)
    }

    /// The geometry to decode a node's `reg` with, given the geometry the
    /// query engine found in scope for it.
    pub fn geometry(&self, scoped: Geometry) -> Geometry {
        match self.mode {
            GeometryMode::Scoped => scoped,
            GeometryMode::Root => Geometry {
                interrupt_cells: scoped.interrupt_cells,
                ..self.root_geometry
            },
        }
    }

    /// Decode the `reg` of `node` into regions without flags.
    pub fn regions(&self, node: &Node, scoped: Geometry) -> Result<Vec<Region>, PassError> {
        Ok(cells::decode_reg(node, self.geometry(scoped))?
            .into_iter()
            .map(|(base, size)| Region::new(base, size))
            .collect())
    }
}

/* === Property accessors === */

/// A node name fit for messages; the root has an empty name.
pub(crate) fn display_name(node: &Node) -> String {
    if node.name.is_empty() {
        "/".to_owned()
    } else {
        node.name.clone()
    }
}

fn unexpected(node: &Node, property: &'static str, expected: &'static str) -> PassError {
    PassError::UnexpectedValue {
        node: display_name(node),
        property,
        expected,
        found: node.value(property).map_or("absent", |v| v.kind()),
    }
}

/// A single string property.
pub(crate) fn string<'n>(
    node: &'n Node,
    property: &'static str,
) -> Result<Option<&'n str>, PassError> {
    node.value(property)
        .map(|value| value.as_str().ok_or_else(|| unexpected(node, property, "a string")))
        .transpose()
}

/// A string or string list property.
pub(crate) fn strings<'n>(
    node: &'n Node,
    property: &'static str,
) -> Result<Option<Vec<&'n str>>, PassError> {
    node.value(property)
        .map(|value| {
            value
                .as_strings()
                .ok_or_else(|| unexpected(node, property, "a string list"))
        })
        .transpose()
}

/// A cell list property.
pub(crate) fn cell_list<'n>(
    node: &'n Node,
    property: &'static str,
) -> Result<Option<&'n [u32]>, PassError> {
    node.value(property)
        .map(|value| {
            value
                .as_cells()
                .ok_or_else(|| unexpected(node, property, "a cell list"))
        })
        .transpose()
}

/// The `compatible` of a device: the first entry names the device class
/// and is dropped, the remaining ones are joined by a space.
pub(crate) fn compatible(node: &Node) -> Result<Option<String>, PassError> {
    Ok(strings(node, "compatible")?
        .map(|list| list.iter().skip(1).copied().collect::<Vec<_>>().join(" ")))
}

#[cfg(test)]
pub(crate) fn decode(builder: dtb_parser::testing::BlobBuilder) -> Fdt {
    dtb_parser::from_bytes(&builder.build()).unwrap()
}
