//! FILE record header and attribute-stream iteration (§4.8).

use crate::attrdef::AttrDef;
use crate::attributes::{parse_attribute_body, AttributeBody};
use crate::error::Result;
use crate::primitive::{read_u16, read_u32, read_u64, read_u8, read_utf16le_string};
use crate::runlist::{decode_data_runs, DataRun};
use crate::structures::{ATTR_TYPE_END, MFT_RECORD_IS_DIRECTORY, MFT_RECORD_IN_USE};
use log::debug;
use std::collections::HashMap;

/// A 64-bit MFT file reference: 48-bit record number, 16-bit sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileReference {
    pub record_number: u64,
    pub sequence_number: u16,
}

impl From<u64> for FileReference {
    fn from(value: u64) -> Self {
        Self {
            record_number: value & 0x0000_FFFF_FFFF_FFFF,
            sequence_number: (value >> 48) as u16,
        }
    }
}

/// Either inline bytes (resident) or a runlist plus VCN bounds (non-resident).
#[derive(Debug, Clone)]
pub enum AttributeContent {
    Resident(Vec<u8>),
    NonResident {
        runlist: Vec<DataRun>,
        start_vcn: u64,
        last_vcn: u64,
        real_size: u64,
    },
}

impl AttributeContent {
    pub fn is_resident(&self) -> bool {
        matches!(self, AttributeContent::Resident(_))
    }
}

/// A single parsed attribute: its header fields plus the dispatched body.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub type_code: u32,
    pub type_name: String,
    pub name: Option<String>,
    pub content: AttributeContent,
    pub body: AttributeBody,
}

/// A parsed FILE record.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub record_number: u64,
    pub flags: u16,
    pub real_size: u32,
    pub allocated_size: u32,
    pub base_file_reference: FileReference,
    pub next_attr_id: u16,
    pub attributes: Vec<Attribute>,
    by_name: HashMap<String, Vec<usize>>,
}

impl FileRecord {
    pub fn is_in_use(&self) -> bool {
        self.flags & MFT_RECORD_IN_USE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & MFT_RECORD_IS_DIRECTORY != 0
    }

    /// All attributes registered under a given AttrDef display name (e.g.
    /// `"$FILE_NAME"`), in order of arrival.
    pub fn by_name(&self, name: &str) -> Vec<&Attribute> {
        self.by_name
            .get(name)
            .map(|indices| indices.iter().map(|&i| &self.attributes[i]).collect())
            .unwrap_or_default()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Appends attributes fetched from a fragment record referenced by
    /// `$ATTRIBUTE_LIST` (§4.9), preserving arrival order.
    pub fn extend_attributes(&mut self, extra: Vec<Attribute>) {
        for attr in extra {
            let idx = self.attributes.len();
            self.by_name
                .entry(attr.type_name.clone())
                .or_default()
                .push(idx);
            self.attributes.push(attr);
        }
    }
}

/// Parses a fixed-up FILE record buffer (§4.8): the fixed header, then the
/// attribute stream. `attrdef` supplies display names; attribute bodies with
/// their own cross-references (attribute lists, index roots) are dispatched
/// via [`parse_attribute_body`] but are not themselves resolved here — that
/// is the MFT resolver's job.
pub fn parse_file_record(
    record_number: u64,
    data: &[u8],
    attrdef: &AttrDef,
) -> Result<FileRecord> {
    let off_first_attr = read_u16(data, 0x14)? as usize;
    let flags = read_u16(data, 0x16)?;
    let real_size = read_u32(data, 0x18)?;
    let allocated_size = read_u32(data, 0x1C)?;
    let base_file_reference = FileReference::from(read_u64(data, 0x20)?);
    let next_attr_id = read_u16(data, 0x28)?;

    let mut attributes = Vec::new();
    let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
    let mut offset = off_first_attr;

    while offset + 4 <= data.len() {
        let type_code = read_u32(data, offset)?;
        if type_code == ATTR_TYPE_END {
            break;
        }

        let attr_length = read_u32(data, offset + 0x04)?;
        let non_resident = read_u8(data, offset + 0x08)? != 0;
        let name_length_units = read_u8(data, offset + 0x09)? as usize;

        let (name, content) = if !non_resident {
            let value_length = read_u32(data, offset + 0x10)? as usize;
            let value_offset = read_u16(data, offset + 0x14)? as usize;
            let name = if name_length_units > 0 {
                Some(read_utf16le_string(
                    data,
                    offset + 0x18,
                    name_length_units * 2,
                )?)
            } else {
                None
            };
            let bytes = data
                .get(offset + value_offset..offset + value_offset + value_length)
                .unwrap_or(&[])
                .to_vec();
            (name, AttributeContent::Resident(bytes))
        } else {
            let start_vcn = read_u64(data, offset + 0x10)?;
            let last_vcn = read_u64(data, offset + 0x18)?;
            let runlist_offset = read_u16(data, offset + 0x20)? as usize;
            let real_size_attr = read_u64(data, offset + 0x30)?;

            let name_offset = if name_length_units > 0 { 0x40 } else { 0 };
            let name = if name_length_units > 0 {
                Some(read_utf16le_string(
                    data,
                    offset + name_offset,
                    name_length_units * 2,
                )?)
            } else {
                None
            };

            let name_bytes = name_length_units * 2;
            let runlist_end = offset + attr_length as usize
                - if name_length_units > 0 { 0x40 + name_bytes } else { 0x40 };
            let runlist_start = offset + runlist_offset;
            let runlist_bytes = if runlist_end > runlist_start && runlist_end <= data.len() {
                &data[runlist_start..runlist_end]
            } else {
                &[]
            };
            let runlist = decode_data_runs(runlist_bytes);

            (
                name,
                AttributeContent::NonResident {
                    runlist,
                    start_vcn,
                    last_vcn,
                    real_size: real_size_attr,
                },
            )
        };

        let type_name = attrdef
            .by_type(type_code)
            .map(|e| e.name.clone())
            .unwrap_or_else(|_| format!("UNKNOWN(0x{type_code:x})"));

        debug!("attribute {type_name} at offset 0x{offset:x}, length 0x{attr_length:x}");

        let body = parse_attribute_body(type_code, &content, data, offset);

        let idx = attributes.len();
        by_name.entry(type_name.clone()).or_default().push(idx);
        attributes.push(Attribute {
            type_code,
            type_name,
            name,
            content,
            body,
        });

        if attr_length == 0 {
            break;
        }
        offset += attr_length as usize;
    }

    Ok(FileRecord {
        record_number,
        flags,
        real_size,
        allocated_size,
        base_file_reference,
        next_attr_id,
        attributes,
        by_name,
    })
}
