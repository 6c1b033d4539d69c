//! Grouping of raw 32-bit cells into addresses, sizes and interrupt specifiers.

use thiserror::Error;

use crate::geometry::Geometry;
use crate::tree::Node;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CellError {
    /// The number of cells is not a multiple of the group width.
    #[error("{cells} cells cannot be split into groups of {group}")]
    InvalidCellCount { cells: usize, group: usize },
    /// A cell width outside of what the decoder supports.
    #[error("unsupported {what} width of {width} cells")]
    UnsupportedWidth { what: &'static str, width: u32 },
    /// The property exists but does not hold cells.
    #[error("`{property}` of node `{node}` is {found}, expected a cell list")]
    NotCells {
        node: String,
        property: &'static str,
        found: &'static str,
    },
}

/// Combine cells into one number, most significant cell first.
pub fn combine(cells: &[u32]) -> u64 {
    cells
        .iter()
        .fold(0u64, |acc, cell| (acc << 32) | u64::from(*cell))
}

/// Decode the `reg` property of `node` into `(address, size)` pairs.
///
/// A node without `reg` yields no pairs.
pub fn decode_reg(node: &Node, geometry: Geometry) -> Result<Vec<(u64, u64)>, CellError> {
    let Geometry {
        address_cells,
        size_cells,
        ..
    } = geometry;

    if !(1..=2).contains(&address_cells) {
        return Err(CellError::UnsupportedWidth {
            what: "address",
            width: address_cells,
        });
    }
    if size_cells > 2 {
        return Err(CellError::UnsupportedWidth {
            what: "size",
            width: size_cells,
        });
    }

    let cells = match node.value("reg") {
        None => return Ok(vec![]),
        Some(value) => value.as_cells().ok_or_else(|| CellError::NotCells {
            node: node.name.clone(),
            property: "reg",
            found: value.kind(),
        })?,
    };

    let address_cells = address_cells as usize;
    Ok(group(cells, address_cells + size_cells as usize)?
        .map(|entry| {
            let (address, size) = entry.split_at(address_cells);
            (combine(address), combine(size))
        })
        .collect())
}

/// Split interrupt cells into specifiers of `interrupt_cells` cells each.
///
/// A width of zero yields no specifiers at all.
pub fn decode_interrupts(cells: &[u32], interrupt_cells: u32) -> Result<Vec<Vec<u32>>, CellError> {
    if interrupt_cells == 0 {
        return Ok(vec![]);
    }

    Ok(group(cells, interrupt_cells as usize)?
        .map(<[u32]>::to_vec)
        .collect())
}

fn group(cells: &[u32], width: usize) -> Result<std::slice::ChunksExact<'_, u32>, CellError> {
    if cells.len() % width != 0 {
        return Err(CellError::InvalidCellCount {
            cells: cells.len(),
            group: width,
        });
    }
    Ok(cells.chunks_exact(width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Property, PropertyValue};

    fn with_reg(value: PropertyValue) -> Node {
        Node {
            name: "memory@40000000".into(),
            properties: vec![Property {
                name: "reg".into(),
                value,
            }],
            children: vec![],
        }
    }

    fn geometry(address_cells: u32, size_cells: u32) -> Geometry {
        Geometry {
            address_cells,
            size_cells,
            interrupt_cells: 0,
        }
    }

    #[test]
    fn combine_big_endian() {
        for (cells, expected) in [
            (&[][..], 0),
            (&[0x4000_0000][..], 0x4000_0000),
            (&[0x1, 0x4000_0000][..], 0x1_4000_0000),
            (&[0xffff_ffff, 0xffff_ffff][..], u64::MAX),
        ] {
            assert_eq!(combine(cells), expected);
        }
    }

    #[test]
    fn decode_reg_for_every_geometry() {
        let cells = [0x1, 0x2, 0x3, 0x4, 0x5, 0x6, 0x7, 0x8, 0x9, 0xa, 0xb, 0xc];

        for (address_cells, size_cells, expected) in [
            (
                1,
                1,
                vec![(0x1, 0x2), (0x3, 0x4), (0x5, 0x6), (0x7, 0x8), (0x9, 0xa), (0xb, 0xc)],
            ),
            (
                1,
                2,
                vec![
                    (0x1, 0x2_0000_0003),
                    (0x4, 0x5_0000_0006),
                    (0x7, 0x8_0000_0009),
                    (0xa, 0xb_0000_000c),
                ],
            ),
            (
                2,
                1,
                vec![
                    (0x1_0000_0002, 0x3),
                    (0x4_0000_0005, 0x6),
                    (0x7_0000_0008, 0x9),
                    (0xa_0000_000b, 0xc),
                ],
            ),
            (
                2,
                2,
                vec![
                    (0x1_0000_0002, 0x3_0000_0004),
                    (0x5_0000_0006, 0x7_0000_0008),
                    (0x9_0000_000a, 0xb_0000_000c),
                ],
            ),
        ] {
            let node = with_reg(PropertyValue::Cells(cells.to_vec()));
            assert_eq!(
                decode_reg(&node, geometry(address_cells, size_cells)),
                Ok(expected)
            );
        }
    }

    #[test]
    fn decode_reg_memory_node() {
        let node = with_reg(PropertyValue::Cells(vec![0x0, 0x4000_0000, 0x0, 0x1000_0000]));

        assert_eq!(
            decode_reg(&node, Geometry::default()),
            Ok(vec![(0x4000_0000, 0x1000_0000)])
        );
    }

    #[test]
    fn decode_reg_without_size() {
        let node = with_reg(PropertyValue::Cells(vec![0x0, 0x1]));

        assert_eq!(decode_reg(&node, geometry(1, 0)), Ok(vec![(0x0, 0), (0x1, 0)]));
    }

    #[test]
    fn decode_reg_rejects_partial_groups() {
        for (len, address_cells, size_cells) in
            [(3, 2, 2), (5, 2, 2), (3, 1, 1), (4, 2, 1), (1, 1, 2)]
        {
            let node = with_reg(PropertyValue::Cells(vec![0; len]));
            assert_eq!(
                decode_reg(&node, geometry(address_cells, size_cells)),
                Err(CellError::InvalidCellCount {
                    cells: len,
                    group: (address_cells + size_cells) as usize
                })
            );
        }
    }

    #[test]
    fn decode_reg_rejects_unsupported_widths() {
        let node = with_reg(PropertyValue::Cells(vec![0; 6]));

        assert_eq!(
            decode_reg(&node, geometry(3, 0)),
            Err(CellError::UnsupportedWidth {
                what: "address",
                width: 3
            })
        );
        assert_eq!(
            decode_reg(&node, geometry(0, 2)),
            Err(CellError::UnsupportedWidth {
                what: "address",
                width: 0
            })
        );
        assert_eq!(
            decode_reg(&node, geometry(1, 3)),
            Err(CellError::UnsupportedWidth {
                what: "size",
                width: 3
            })
        );
    }

    #[test]
    fn decode_reg_absent_or_mistyped() {
        let node = Node {
            name: "chosen".into(),
            ..Default::default()
        };
        assert_eq!(decode_reg(&node, Geometry::default()), Ok(vec![]));

        let node = with_reg(PropertyValue::Str("0x0".into()));
        assert_eq!(
            decode_reg(&node, Geometry::default()),
            Err(CellError::NotCells {
                node: "memory@40000000".into(),
                property: "reg",
                found: "a string",
            })
        );
    }

    #[test]
    fn decode_interrupt_specifiers() {
        let cells = [0x1, 0xd, 0xf08, 0x1, 0xe, 0xf08];

        assert_eq!(
            decode_interrupts(&cells, 3),
            Ok(vec![vec![0x1, 0xd, 0xf08], vec![0x1, 0xe, 0xf08]])
        );
        assert_eq!(decode_interrupts(&cells, 0), Ok(vec![]));
        assert_eq!(
            decode_interrupts(&cells[1..], 3),
            Err(CellError::InvalidCellCount { cells: 5, group: 3 })
        );
    }
}
