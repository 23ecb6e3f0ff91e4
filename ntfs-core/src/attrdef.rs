//! `$AttrDef` (file record #4) registry: attribute type code -> display name.

use crate::error::{NtfsError, Result};
use crate::primitive::{read_u32, read_utf16le_string};
use std::collections::HashMap;

const ATTRDEF_ENTRY_SIZE: usize = 0xA0;
const ATTRDEF_LABEL_BYTES: usize = 0x80;

#[derive(Debug, Clone)]
pub struct AttrDefEntry {
    pub name: String,
    pub type_code: u32,
    pub flags: u32,
}

/// `$AttrDef` contents, keyed by attribute type code.
#[derive(Debug, Clone, Default)]
pub struct AttrDef {
    by_type: HashMap<u32, AttrDefEntry>,
}

impl AttrDef {
    /// Parses the raw `$AttrDef` `$DATA` payload into a type->entry table.
    /// Stops at the first zero-typed entry, matching the on-disk terminator.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut by_type = HashMap::new();
        let mut offset = 0usize;

        while offset + ATTRDEF_ENTRY_SIZE <= data.len() {
            let type_code = read_u32(data, offset + 0x80)?;
            if type_code == 0 {
                break;
            }
            let flags = read_u32(data, offset + 0x8C)?;
            let name = read_utf16le_string(data, offset, ATTRDEF_LABEL_BYTES)?;

            by_type.insert(
                type_code,
                AttrDefEntry {
                    name,
                    type_code,
                    flags,
                },
            );

            offset += ATTRDEF_ENTRY_SIZE;
        }

        Ok(Self { by_type })
    }

    pub fn by_type(&self, type_code: u32) -> Result<&AttrDefEntry> {
        self.by_type
            .get(&type_code)
            .ok_or(NtfsError::UnknownAttrType(type_code))
    }

    pub fn entries(&self) -> impl Iterator<Item = &AttrDefEntry> {
        self.by_type.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_bytes(label: &str, type_code: u32, flags: u32) -> Vec<u8> {
        let mut entry = vec![0u8; ATTRDEF_ENTRY_SIZE];
        let utf16: Vec<u16> = label.encode_utf16().collect();
        for (i, unit) in utf16.iter().enumerate() {
            let b = unit.to_le_bytes();
            entry[i * 2] = b[0];
            entry[i * 2 + 1] = b[1];
        }
        entry[0x80..0x84].copy_from_slice(&type_code.to_le_bytes());
        entry[0x8C..0x90].copy_from_slice(&flags.to_le_bytes());
        entry
    }

    #[test]
    fn parses_entries_until_zero_terminator() {
        let mut data = entry_bytes("$STANDARD_INFORMATION", 0x10, 0);
        data.extend(entry_bytes("$FILE_NAME", 0x30, 0x02));
        data.extend(entry_bytes("", 0, 0)); // terminator

        let attrdef = AttrDef::parse(&data).unwrap();
        assert_eq!(attrdef.by_type(0x10).unwrap().name, "$STANDARD_INFORMATION");
        assert_eq!(attrdef.by_type(0x30).unwrap().name, "$FILE_NAME");
        assert!(attrdef.by_type(0x99).is_err());
    }
}
