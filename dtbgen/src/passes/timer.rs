use dtb_parser::{cells, cells::CellError};
use log::debug;

use super::{cell_list, compatible, display_name, Context};
use crate::error::PassError;

/// One timer interrupt. Fields the specifier width does not carry are `None`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSpecifier {
    pub irq_type: Option<u32>,
    pub number: u32,
    pub trig_type: Option<u32>,
}

impl InterruptSpecifier {
    /// Map a specifier of one to three cells onto its fields.
    fn from_cells(cells: &[u32]) -> Result<Self, CellError> {
        match *cells {
            [number] => Ok(Self {
                number,
                ..Default::default()
            }),
            [number, trig_type] => Ok(Self {
                number,
                trig_type: Some(trig_type),
                ..Default::default()
            }),
            [irq_type, number, trig_type] => Ok(Self {
                irq_type: Some(irq_type),
                number,
                trig_type: Some(trig_type),
            }),
            _ => Err(CellError::UnsupportedWidth {
                what: "interrupt specifier",
                width: cells.len() as u32,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    pub interrupts: Vec<InterruptSpecifier>,
    pub always_on: bool,
    pub compatible: String,
}

/// The top-level `timer` node, decoded with the interrupt controller's
/// specifier width. Nothing is emitted for a width of zero.
pub fn scan(ctx: &Context, interrupt_cells: u32) -> Result<Option<Timer>, PassError> {
    if interrupt_cells == 0 {
        debug!("interrupt controller has zero-width specifiers, no timer");
        return Ok(None);
    }
    let node = match ctx.top_level("timer") {
        Some(timer) => timer.node,
        None => {
            debug!("no /timer node");
            return Ok(None);
        }
    };

    if interrupt_cells > 3 {
        return Err(CellError::UnsupportedWidth {
            what: "interrupt specifier",
            width: interrupt_cells,
        }
        .into());
    }

    let interrupts = cell_list(node, "interrupts")?.ok_or_else(|| PassError::MissingProperty {
        node: display_name(node),
        property: "interrupts",
    })?;
    // The leading cell is not part of any specifier.
    let interrupts = interrupts.split_first().map_or(interrupts, |(_, rest)| rest);

    let interrupts = cells::decode_interrupts(interrupts, interrupt_cells)?
        .iter()
        .map(|specifier| InterruptSpecifier::from_cells(specifier))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Timer {
        interrupts,
        always_on: node.has_property("always-on"),
        compatible: compatible(node)?.unwrap_or_default(),
    }))
}
