use std::str;

use log::{debug, trace};
use nom::{
    bytes::complete::{tag, take, take_until},
    combinator::{map, verify},
    error::{Error, ErrorKind},
    multi::many_till,
    number::complete::{be_u32, be_u64},
    sequence::{terminated, tuple},
    Finish,
};

use crate::tree::*;

mod errors;

pub use errors::DecodeError;

type Input<'a> = &'a [u8];

type IResult<'a, T> = nom::IResult<Input<'a>, T>;

/// Magic number at the start of every blob.
pub const FDT_MAGIC: u32 = 0xd00d_feed;

/// Size of a version 17 header.
pub const HEADER_SIZE: usize = 40;

/// Most recent format version this decoder understands.
const LAST_SUPPORTED_VERSION: u32 = 17;

const FDT_BEGIN_NODE: u32 = 0x0000_0001;
const FDT_END_NODE: u32 = 0x0000_0002;
const FDT_PROP: u32 = 0x0000_0003;
const FDT_NOP: u32 = 0x0000_0004;
const FDT_END: u32 = 0x0000_0009;

/// The blob header. All fields are stored big-endian in the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub total_size: u32,
    pub off_dt_struct: u32,
    pub off_dt_strings: u32,
    pub off_mem_rsvmap: u32,
    pub version: u32,
    pub last_comp_version: u32,
    pub boot_cpuid_phys: u32,
    pub size_dt_strings: u32,
    pub size_dt_struct: u32,
}

/// A token of the structure block.
///
/// The structure block is decoded into a flat token stream first and then
/// assembled into a [`Node`] tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    BeginNode(Input<'a>),
    Prop { name_offset: u32, value: Input<'a> },
    EndNode,
    Nop,
}

/// Decode a flattened device tree blob.
pub fn from_bytes(data: &[u8]) -> Result<Fdt, DecodeError> {
    let total_size = total_size(data)? as usize;
    if total_size < HEADER_SIZE {
        return Err(DecodeError::malformed(format!(
            "declared total size {total_size} is smaller than the header"
        )));
    }
    if data.len() < total_size {
        return Err(DecodeError::TruncatedInput {
            needed: total_size,
            available: data.len(),
        });
    }

    let blob = &data[..total_size];
    let (_, header) = header(blob)
        .finish()
        .map_err(|_| DecodeError::malformed("unreadable header"))?;

    if header.last_comp_version > LAST_SUPPORTED_VERSION {
        return Err(DecodeError::malformed(format!(
            "unsupported last compatible version {} (newest supported is {})",
            header.last_comp_version, LAST_SUPPORTED_VERSION
        )));
    }
    debug!(
        "blob header: version {}, {} bytes, boot cpu {}",
        header.version, header.total_size, header.boot_cpuid_phys
    );

    let reservations = block(blob, header.off_mem_rsvmap, None, "memory reservation")?;
    let (_, reservations) = reservation_block(reservations)
        .finish()
        .map_err(|_| DecodeError::malformed("unterminated memory reservation block"))?;

    let strings = block(
        blob,
        header.off_dt_strings,
        Some(header.size_dt_strings),
        "strings",
    )?;

    // `size_dt_struct` only exists since version 17.
    let struct_size = (header.version >= 17).then_some(header.size_dt_struct);
    let structure = block(blob, header.off_dt_struct, struct_size, "structure")?;
    let root = assemble(&structure_tokens(structure)?, strings)?;

    Ok(Fdt {
        header,
        reservations,
        root,
    })
}

/// Read the `totalsize` field at offset 4, after checking the magic in front of it.
pub fn total_size(data: &[u8]) -> Result<u32, DecodeError> {
    let (_, (magic, total_size)) = tuple((be_u32, be_u32))(data)
        .finish()
        .map_err(|_: Error<Input>| DecodeError::TruncatedInput {
            needed: 8,
            available: data.len(),
        })?;

    if magic != FDT_MAGIC {
        return Err(DecodeError::malformed(format!(
            "bad magic {magic:#010x}, expected {FDT_MAGIC:#010x}"
        )));
    }

    Ok(total_size)
}

/// Select one block of the blob, making sure it lies within the blob.
///
/// Without a size, the block extends to the end of the blob.
fn block<'a>(
    blob: Input<'a>,
    offset: u32,
    size: Option<u32>,
    what: &str,
) -> Result<Input<'a>, DecodeError> {
    let start = offset as usize;
    let end = match size {
        Some(size) => start.checked_add(size as usize),
        None => Some(blob.len()),
    };

    end.and_then(|end| blob.get(start..end)).ok_or_else(|| {
        DecodeError::malformed(format!(
            "{what} block at offset {offset:#x} lies outside of the blob"
        ))
    })
}

/* === Header and memory reservation block === */

/// Parse the header of a blob.
fn header(input: Input) -> IResult<Header> {
    map(
        tuple((
            be_u32, be_u32, be_u32, be_u32, be_u32, be_u32, be_u32, be_u32, be_u32, be_u32,
        )),
        |(
            magic,
            total_size,
            off_dt_struct,
            off_dt_strings,
            off_mem_rsvmap,
            version,
            last_comp_version,
            boot_cpuid_phys,
            size_dt_strings,
            size_dt_struct,
        )| Header {
            magic,
            total_size,
            off_dt_struct,
            off_dt_strings,
            off_mem_rsvmap,
            version,
            last_comp_version,
            boot_cpuid_phys,
            size_dt_strings,
            size_dt_struct,
        },
    )(input)
}

/// Parse the memory reservation block up to its all-zero terminator.
fn reservation_block(input: Input) -> IResult<Vec<Reservation>> {
    map(
        many_till(reservation, reservation_terminator),
        |(entries, _)| entries,
    )(input)
}

/// Parse a single reservation entry.
fn reservation(input: Input) -> IResult<Reservation> {
    map(tuple((be_u64, be_u64)), |(address, size)| Reservation {
        address,
        size,
    })(input)
}

/// Recognize the entry terminating the reservation block.
fn reservation_terminator(input: Input) -> IResult<Reservation> {
    verify(reservation, |r| r.address == 0 && r.size == 0)(input)
}

/* === Structure block === */

/// Split the structure block into tokens, up to and excluding `FDT_END`.
fn structure_tokens<'a>(block: Input<'a>) -> Result<Vec<Token<'a>>, DecodeError> {
    many_till(|input: Input<'a>| structure_token(block, input), end_token)(block)
        .finish()
        .map(|(_, (tokens, _))| tokens)
        .map_err(|e| {
            DecodeError::malformed(format!(
                "invalid structure block token at offset {:#x}",
                block.len() - e.input.len()
            ))
        })
}

/// Parse a single structure block token along with its payload.
///
/// `block` is the whole structure block, needed to align payloads to the
/// next token boundary.
fn structure_token<'a>(block: Input<'a>, input: Input<'a>) -> IResult<'a, Token<'a>> {
    let (rest, token) = be_u32(input)?;

    match token {
        FDT_BEGIN_NODE => {
            let (rest, name) = terminated(take_until(&b"\0"[..]), tag(&b"\0"[..]))(rest)?;
            let (rest, _) = padding(block, rest)?;
            Ok((rest, Token::BeginNode(name)))
        }
        FDT_PROP => {
            let (rest, (len, name_offset)) = tuple((be_u32, be_u32))(rest)?;
            let (rest, value) = take(len)(rest)?;
            let (rest, _) = padding(block, rest)?;
            Ok((rest, Token::Prop { name_offset, value }))
        }
        FDT_END_NODE => Ok((rest, Token::EndNode)),
        FDT_NOP => Ok((rest, Token::Nop)),
        _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
    }
}

/// Recognize the `FDT_END` token.
fn end_token(input: Input) -> IResult<u32> {
    verify(be_u32, |t| *t == FDT_END)(input)
}

/// Consume the zero bytes up to the next 4-byte boundary of the block.
fn padding<'a>(block: Input<'a>, input: Input<'a>) -> IResult<'a, Input<'a>> {
    let offset = block.len() - input.len();
    take(align_to_token(offset) - offset)(input)
}

/// Align a structure block offset to the next token boundary.
const fn align_to_token(n: usize) -> usize {
    (n + 3) & !3
}

/// Assemble the token stream into the node tree.
fn assemble(tokens: &[Token], strings: Input) -> Result<Node, DecodeError> {
    let mut open: Vec<Node> = Vec::new();
    let mut root = None;

    for token in tokens {
        trace!("{token:?}");

        match *token {
            Token::Nop => {}
            Token::BeginNode(name) => {
                if root.is_some() {
                    return Err(DecodeError::malformed("node found after the root node"));
                }
                let name = str::from_utf8(name)
                    .map_err(|_| DecodeError::malformed("node name is not valid UTF-8"))?;
                open.push(Node {
                    name: name.to_owned(),
                    ..Default::default()
                });
            }
            Token::Prop { name_offset, value } => {
                let node = open
                    .last_mut()
                    .ok_or_else(|| DecodeError::malformed("property outside of any node"))?;
                let name = string_at(strings, name_offset)?;
                node.properties.push(Property {
                    name: name.to_owned(),
                    value: PropertyValue::from_raw(name, value),
                });
            }
            Token::EndNode => {
                let node = open
                    .pop()
                    .ok_or_else(|| DecodeError::malformed("unbalanced FDT_END_NODE"))?;
                match open.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
        }
    }

    if let Some(node) = open.last() {
        return Err(DecodeError::malformed(format!(
            "structure block ends inside node `{}`",
            node.name
        )));
    }

    match root {
        Some(root) if root.name.is_empty() => Ok(root),
        Some(root) => Err(DecodeError::malformed(format!(
            "root node is named `{}`, expected an empty name",
            root.name
        ))),
        None => Err(DecodeError::malformed("structure block contains no root node")),
    }
}

/// Fetch a property name from the strings block.
fn string_at(strings: Input, offset: u32) -> Result<&str, DecodeError> {
    let name = strings
        .get(offset as usize..)
        .and_then(|s| s.iter().position(|b| *b == 0).map(|end| &s[..end]))
        .ok_or_else(|| {
            DecodeError::malformed(format!("no property name at strings offset {offset:#x}"))
        })?;

    str::from_utf8(name).map_err(|_| DecodeError::malformed("property name is not valid UTF-8"))
}

/* === Unit Tests === */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BlobBuilder;

    fn be(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    #[test]
    fn parse_header() {
        let input = be(&[FDT_MAGIC, 0x100, 0x38, 0xe0, 0x28, 17, 16, 0, 0x20, 0xa8]);

        assert_eq!(
            header(&input),
            Ok((
                &b""[..],
                Header {
                    magic: FDT_MAGIC,
                    total_size: 0x100,
                    off_dt_struct: 0x38,
                    off_dt_strings: 0xe0,
                    off_mem_rsvmap: 0x28,
                    version: 17,
                    last_comp_version: 16,
                    boot_cpuid_phys: 0,
                    size_dt_strings: 0x20,
                    size_dt_struct: 0xa8,
                }
            ))
        );
    }

    #[test]
    fn parse_reservation_block() {
        let input = be(&[0, 0x4000_0000, 0, 0x1000, 0x1, 0, 0, 0x20, 0, 0, 0, 0]);

        let (rest, entries) = reservation_block(&input).unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            entries,
            vec![
                Reservation {
                    address: 0x4000_0000,
                    size: 0x1000
                },
                Reservation {
                    address: 0x1_0000_0000,
                    size: 0x20
                },
            ]
        );

        assert!(reservation_block(&be(&[0, 1, 0, 1])).is_err());
    }

    #[test]
    fn parse_structure_tokens() {
        let mut input = be(&[FDT_BEGIN_NODE]);
        input.extend_from_slice(b"cpu@0\0\0\0");
        input.extend(be(&[FDT_NOP, FDT_PROP, 5, 0x10]));
        input.extend_from_slice(b"okay\0\0\0\0");
        input.extend(be(&[FDT_END_NODE, FDT_END]));

        assert_eq!(
            structure_tokens(&input),
            Ok(vec![
                Token::BeginNode(b"cpu@0"),
                Token::Nop,
                Token::Prop {
                    name_offset: 0x10,
                    value: b"okay\0",
                },
                Token::EndNode,
            ])
        );
    }

    #[test]
    fn reject_unknown_tokens() {
        let input = be(&[FDT_BEGIN_NODE, 0, 0x7, FDT_END]);

        assert_eq!(
            structure_tokens(&input),
            Err(DecodeError::MalformedBlob(
                "invalid structure block token at offset 0x8".into()
            ))
        );
    }

    #[test]
    fn decode_simple_blob() {
        let blob = BlobBuilder::new()
            .reserve(0x4800_0000, 0x10_0000)
            .begin_node("")
            .prop_cells("#address-cells", &[2])
            .prop_str("model", "linux,dummy-virt")
            .begin_node("chosen")
            .prop_str("stdout-path", "/pl011@9000000")
            .end_node()
            .begin_node("psci")
            .prop_empty("always-on")
            .end_node()
            .end_node()
            .build();

        let fdt = from_bytes(&blob).unwrap();

        assert_eq!(fdt.total_size() as usize, blob.len());
        assert_eq!(
            fdt.reservations,
            vec![Reservation {
                address: 0x4800_0000,
                size: 0x10_0000
            }]
        );
        assert_eq!(fdt.root.name, "");
        assert_eq!(
            fdt.root.value("#address-cells"),
            Some(&PropertyValue::Cells(vec![2]))
        );
        assert_eq!(
            fdt.root.value("model").and_then(PropertyValue::as_str),
            Some("linux,dummy-virt")
        );
        assert_eq!(
            fdt.root
                .children
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            ["chosen", "psci"]
        );
        assert_eq!(
            fdt.root.child("psci").unwrap().value("always-on"),
            Some(&PropertyValue::Empty)
        );
    }

    #[test]
    fn reject_bad_magic() {
        let mut blob = BlobBuilder::new().begin_node("").end_node().build();
        blob[0] = 0xde;

        assert!(matches!(
            from_bytes(&blob),
            Err(DecodeError::MalformedBlob(_))
        ));
    }

    #[test]
    fn reject_newer_last_compatible_version() {
        let mut blob = BlobBuilder::new().begin_node("").end_node().build();
        blob[24..28].copy_from_slice(&18u32.to_be_bytes());

        assert_eq!(
            from_bytes(&blob),
            Err(DecodeError::MalformedBlob(
                "unsupported last compatible version 18 (newest supported is 17)".into()
            ))
        );
    }

    #[test]
    fn reject_truncated_blobs() {
        let blob = BlobBuilder::new().begin_node("").end_node().build();

        for (len, needed) in [(0, 8), (7, 8), (blob.len() - 1, blob.len())] {
            assert_eq!(
                from_bytes(&blob[..len]),
                Err(DecodeError::TruncatedInput {
                    needed,
                    available: len
                })
            );
        }
    }

    #[test]
    fn total_size_ignores_trailing_bytes() {
        let mut blob = BlobBuilder::new().begin_node("").end_node().build();
        let len = blob.len();
        blob.extend_from_slice(&[0xff; 16]);

        assert_eq!(total_size(&blob), Ok(len as u32));
        assert!(from_bytes(&blob).is_ok());
    }

    #[test]
    fn reject_unbalanced_structure() {
        let blob = BlobBuilder::new().begin_node("").begin_node("cpus").end_node().build();

        assert_eq!(
            from_bytes(&blob),
            Err(DecodeError::MalformedBlob(
                "structure block ends inside node ``".into()
            ))
        );
    }

    #[test]
    fn reject_named_root() {
        let blob = BlobBuilder::new().begin_node("root").end_node().build();

        assert!(matches!(
            from_bytes(&blob),
            Err(DecodeError::MalformedBlob(_))
        ));
    }
}
