//! Construction of device tree blobs for tests and benchmarks.

use crate::parser::{FDT_MAGIC, HEADER_SIZE};

const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_END: u32 = 0x9;

/// Builds a version 17 blob the same way `dtc` lays it out: header,
/// memory reservation block, structure block, strings block.
///
/// ```
/// # use dtb_parser::testing::BlobBuilder;
/// let blob = BlobBuilder::new()
///     .begin_node("")
///     .prop_cells("#address-cells", &[2])
///     .end_node()
///     .build();
/// assert!(dtb_parser::from_bytes(&blob).is_ok());
/// ```
#[derive(Debug, Default, Clone)]
pub struct BlobBuilder {
    reservations: Vec<(u64, u64)>,
    structure: Vec<u8>,
    strings: Vec<u8>,
}

impl BlobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the memory reservation block.
    pub fn reserve(mut self, address: u64, size: u64) -> Self {
        self.reservations.push((address, size));
        self
    }

    pub fn begin_node(mut self, name: &str) -> Self {
        self.word(FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        self.pad();
        self
    }

    pub fn end_node(mut self) -> Self {
        self.word(FDT_END_NODE);
        self
    }

    pub fn prop_raw(mut self, name: &str, value: &[u8]) -> Self {
        let name_offset = self.string_offset(name);
        self.word(FDT_PROP);
        self.word(value.len() as u32);
        self.word(name_offset);
        self.structure.extend_from_slice(value);
        self.pad();
        self
    }

    pub fn prop_empty(self, name: &str) -> Self {
        self.prop_raw(name, &[])
    }

    pub fn prop_cells(self, name: &str, cells: &[u32]) -> Self {
        let value: Vec<u8> = cells.iter().flat_map(|c| c.to_be_bytes()).collect();
        self.prop_raw(name, &value)
    }

    pub fn prop_str(self, name: &str, value: &str) -> Self {
        self.prop_strs(name, &[value])
    }

    pub fn prop_strs(self, name: &str, values: &[&str]) -> Self {
        let value: Vec<u8> = values
            .iter()
            .flat_map(|s| s.bytes().chain(Some(0)))
            .collect();
        self.prop_raw(name, &value)
    }

    /// Lay out the blob. Node nesting is not checked.
    pub fn build(&self) -> Vec<u8> {
        let mut structure = self.structure.clone();
        structure.extend_from_slice(&FDT_END.to_be_bytes());

        let off_mem_rsvmap = HEADER_SIZE;
        let off_dt_struct = off_mem_rsvmap + (self.reservations.len() + 1) * 16;
        let off_dt_strings = off_dt_struct + structure.len();
        let total_size = off_dt_strings + self.strings.len();

        let header = [
            FDT_MAGIC,
            total_size as u32,
            off_dt_struct as u32,
            off_dt_strings as u32,
            off_mem_rsvmap as u32,
            17,
            16,
            0,
            self.strings.len() as u32,
            structure.len() as u32,
        ];

        let mut blob = Vec::with_capacity(total_size);
        blob.extend(header.iter().flat_map(|w| w.to_be_bytes()));
        for (address, size) in self.reservations.iter().chain(Some(&(0, 0))) {
            blob.extend_from_slice(&address.to_be_bytes());
            blob.extend_from_slice(&size.to_be_bytes());
        }
        blob.extend_from_slice(&structure);
        blob.extend_from_slice(&self.strings);
        blob
    }

    fn word(&mut self, word: u32) {
        self.structure.extend_from_slice(&word.to_be_bytes());
    }

    fn pad(&mut self) {
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }

    /// Offset of `name` in the strings block, appending it on first use.
    fn string_offset(&mut self, name: &str) -> u32 {
        let mut offset = 0;
        for s in self.strings.split(|b| *b == 0) {
            if s == name.as_bytes() && offset < self.strings.len() {
                return offset as u32;
            }
            offset += s.len() + 1;
        }

        let offset = self.strings.len();
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        offset as u32
    }
}
