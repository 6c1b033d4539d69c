use crate::parser::Header;

/// A decoded flattened device tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fdt {
    pub header: Header,
    pub reservations: Vec<Reservation>,
    pub root: Node,
}

impl Fdt {
    /// The `totalsize` field of the blob header, as reported by the blob itself.
    pub fn total_size(&self) -> u32 {
        self.header.total_size
    }
}

/// An entry of the memory reservation block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub address: u64,
    pub size: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<Node>,
}

impl Node {
    /// The node name without its unit address, e.g. `memory` for `memory@40000000`.
    pub fn base_name(&self) -> &str {
        match self.name.split_once('@') {
            Some((base, _)) => base,
            None => &self.name,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&PropertyValue> {
        self.property(name).map(|p| &p.value)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Look up a direct child, either by its full name or by its base name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.children.iter().find(|c| c.base_name() == name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

/// The shape of a property value, recovered from its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// A marker property without value, e.g. `interrupt-controller;`.
    Empty,
    Str(String),
    StrList(Vec<String>),
    Cells(Vec<u32>),
    Bytes(Vec<u8>),
}

/// Properties whose value is always a list of cells, even when the bytes
/// happen to look like a printable string.
const CELL_PROPERTIES: &[&str] = &[
    "reg",
    "ranges",
    "dma-ranges",
    "#address-cells",
    "#size-cells",
    "#interrupt-cells",
    "interrupts",
    "interrupt-parent",
    "phandle",
    "linux,phandle",
    "linux,initrd-start",
    "linux,initrd-end",
    "clock-frequency",
    "timebase-frequency",
    "migrate",
    "cpu_on",
    "cpu_off",
    "cpu_suspend",
];

impl PropertyValue {
    pub(crate) fn from_raw(name: &str, raw: &[u8]) -> Self {
        if raw.is_empty() {
            return PropertyValue::Empty;
        }

        let cells = raw.len() % 4 == 0;
        if cells && CELL_PROPERTIES.contains(&name) {
            return PropertyValue::Cells(to_cells(raw));
        }

        match string_list(raw) {
            Some(mut strings) if strings.len() == 1 => PropertyValue::Str(strings.remove(0)),
            Some(strings) => PropertyValue::StrList(strings),
            None if cells => PropertyValue::Cells(to_cells(raw)),
            None => PropertyValue::Bytes(raw.to_vec()),
        }
    }

    /// A short description of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::Empty => "an empty marker",
            PropertyValue::Str(_) => "a string",
            PropertyValue::StrList(_) => "a string list",
            PropertyValue::Cells(_) => "a cell list",
            PropertyValue::Bytes(_) => "a byte string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// String values as a list; a single string is a list of one.
    pub fn as_strings(&self) -> Option<Vec<&str>> {
        match self {
            PropertyValue::Str(s) => Some(vec![s.as_str()]),
            PropertyValue::StrList(l) => Some(l.iter().map(String::as_str).collect()),
            _ => None,
        }
    }

    pub fn as_cells(&self) -> Option<&[u32]> {
        match self {
            PropertyValue::Cells(c) => Some(c),
            _ => None,
        }
    }

    /// The value of a single-cell property.
    pub fn as_u32(&self) -> Option<u32> {
        match self.as_cells()? {
            [cell] => Some(*cell),
            _ => None,
        }
    }
}

fn to_cells(raw: &[u8]) -> Vec<u32> {
    raw.chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Split a raw value into strings if it is a sequence of non-empty,
/// NUL-terminated UTF-8 strings without control characters.
fn string_list(raw: &[u8]) -> Option<Vec<String>> {
    let body = raw.strip_suffix(&[0])?;

    body.split(|b| *b == 0)
        .map(|s| {
            let s = std::str::from_utf8(s).ok()?;
            if s.is_empty() || s.chars().any(char::is_control) {
                return None;
            }
            Some(s.to_owned())
        })
        .collect()
}
