use std::fmt;

use dtb_parser::{cells::CellError, DecodeError};
use thiserror::Error;

/// The extraction passes, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    MachineName,
    Initrd,
    Memory,
    ReservedMemory,
    Console,
    Psci,
    Cpus,
    InterruptController,
    Timer,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pass::MachineName => "machine-name",
            Pass::Initrd => "initrd",
            Pass::Memory => "memory",
            Pass::ReservedMemory => "reserved-memory",
            Pass::Console => "console",
            Pass::Psci => "psci",
            Pass::Cpus => "cpus",
            Pass::InterruptController => "interrupt-controller",
            Pass::Timer => "timer",
        })
    }
}

/// A failure of a single extraction pass.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PassError {
    #[error(transparent)]
    Cells(#[from] CellError),
    #[error("node `{node}` has no `{property}` property")]
    MissingProperty { node: String, property: &'static str },
    #[error("`{property}` of node `{node}` is {found}, expected {expected}")]
    UnexpectedValue {
        node: String,
        property: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{0}")]
    MissingMandatoryNode(String),
    #[error("node `{node}` has {found} `reg` regions, expected {expected}")]
    RegionCount {
        node: String,
        expected: usize,
        found: usize,
    },
}

impl PassError {
    /// Whether the failure only concerns the table of the pass that hit it.
    ///
    /// Cell grouping failures are; a property of the wrong shape or a
    /// missing mandatory field is not.
    pub fn is_pass_local(&self) -> bool {
        matches!(
            self,
            PassError::Cells(
                CellError::InvalidCellCount { .. } | CellError::UnsupportedWidth { .. }
            )
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("`{field}` contains characters that would need escaping: {value:?}")]
    EscapeRequired { field: String, value: String },
    #[error("failed to format the generated header")]
    Format(#[from] fmt::Error),
}

/// Everything that can make a compilation fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("{pass} pass failed")]
    Pass {
        pass: Pass,
        #[source]
        source: PassError,
    },
    #[error(transparent)]
    Emit(#[from] EmitError),
}
