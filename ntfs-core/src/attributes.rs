//! Attribute body dispatch: decodes the attribute-specific payload behind
//! the common header already parsed by [`crate::file_record`] (§4.9).

use crate::attribute_list::{parse_attribute_list, AttributeListEntry};
use crate::file_record::{AttributeContent, FileReference};
use crate::index::{parse_index_root, IndexRoot};
use crate::primitive::{read_u16, read_u32, read_u64, read_utf16le_string};
use crate::structures::{
    filetime_to_unix, ATTR_TYPE_ATTRIBUTE_LIST, ATTR_TYPE_FILE_NAME, ATTR_TYPE_INDEX_ALLOCATION,
    ATTR_TYPE_INDEX_ROOT, ATTR_TYPE_REPARSE_POINT, ATTR_TYPE_STANDARD_INFORMATION,
    REPARSE_TAG_MOUNT_POINT_QUIRK,
};

/// `$STANDARD_INFORMATION` (0x10): timestamps and DOS file attribute flags.
#[derive(Debug, Clone)]
pub struct StandardInformation {
    pub created: u64,
    pub modified: u64,
    pub mft_modified: u64,
    pub accessed: u64,
    pub file_attributes: u32,
}

/// `$FILE_NAME` (0x30): one hardlink's name, parent directory, and cached
/// size/time fields (§4.9).
#[derive(Debug, Clone)]
pub struct FileNameAttribute {
    pub parent_directory: FileReference,
    pub created: u64,
    pub modified: u64,
    pub mft_modified: u64,
    pub accessed: u64,
    pub allocated_size: u64,
    pub real_size: u64,
    pub file_attributes: u32,
    pub namespace: u8,
    pub name: String,
}

/// `$REPARSE_POINT` (0xC0): symlink / mount point / junction target.
#[derive(Debug, Clone)]
pub struct ReparsePoint {
    pub reparse_tag: u32,
    pub substitute_name: String,
    pub print_name: String,
}

/// Attribute-specific payload, tagged by type (§9 design note). Variants
/// that need cross-record or cross-attribute resolution (attribute lists,
/// index roots) carry their already-parsed content; `$INDEX_ALLOCATION` and
/// `$DATA` carry none here since their real content lives in
/// [`AttributeContent`] and is resolved by the MFT/index walkers.
#[derive(Debug, Clone)]
pub enum AttributeBody {
    StandardInfo(StandardInformation),
    AttributeList(Vec<AttributeListEntry>),
    FileName(FileNameAttribute),
    Data,
    IndexRoot(IndexRoot),
    IndexAllocation,
    ReparsePoint(ReparsePoint),
    Unknown(u32),
}

fn parse_standard_information(bytes: &[u8]) -> Option<StandardInformation> {
    Some(StandardInformation {
        created: read_u64(bytes, 0x00).ok()?,
        modified: read_u64(bytes, 0x08).ok()?,
        mft_modified: read_u64(bytes, 0x10).ok()?,
        accessed: read_u64(bytes, 0x18).ok()?,
        file_attributes: read_u32(bytes, 0x20).ok()?,
    })
}

impl StandardInformation {
    pub fn created_unix(&self) -> u64 {
        filetime_to_unix(self.created)
    }

    pub fn modified_unix(&self) -> u64 {
        filetime_to_unix(self.modified)
    }
}

fn parse_file_name(bytes: &[u8]) -> Option<FileNameAttribute> {
    let name_length_chars = *bytes.get(0x40)? as usize;
    let namespace = *bytes.get(0x41)?;
    let name = read_utf16le_string(bytes, 0x42, name_length_chars * 2).ok()?;

    Some(FileNameAttribute {
        parent_directory: FileReference::from(read_u64(bytes, 0x00).ok()?),
        created: read_u64(bytes, 0x08).ok()?,
        modified: read_u64(bytes, 0x10).ok()?,
        mft_modified: read_u64(bytes, 0x18).ok()?,
        accessed: read_u64(bytes, 0x20).ok()?,
        allocated_size: read_u64(bytes, 0x28).ok()?,
        real_size: read_u64(bytes, 0x30).ok()?,
        file_attributes: read_u32(bytes, 0x38).ok()?,
        namespace,
        name,
    })
}

/// Strips the Windows `\??\C:\` NT-namespace-plus-drive-letter prefix that
/// leads every substitute/print name, mirroring the original parser's
/// unconditional `[7:]` slice.
fn strip_nt_namespace_prefix(s: &str) -> &str {
    if s.starts_with(r"\??\") {
        s.get(7..).unwrap_or(s)
    } else {
        s
    }
}

fn parse_reparse_point(bytes: &[u8]) -> Option<ReparsePoint> {
    let reparse_tag = read_u32(bytes, 0x00).ok()?;

    let data_base = 0x08;
    let substitute_name_offset = read_u16(bytes, data_base).ok()? as usize;
    let mut substitute_name_length = read_u16(bytes, data_base + 0x02).ok()? as usize;
    let print_name_offset = read_u16(bytes, data_base + 0x04).ok()? as usize;
    let print_name_length = read_u16(bytes, data_base + 0x06).ok()? as usize;

    // Tag 0xA000000C (mount point) pads its substitute-name buffer with an
    // undocumented extra 4 bytes not reflected in the declared length field.
    if reparse_tag == REPARSE_TAG_MOUNT_POINT_QUIRK {
        substitute_name_length += 4;
    }

    let path_buffer_base = data_base + 0x08;

    let substitute_name = read_utf16le_string(
        bytes,
        path_buffer_base + substitute_name_offset,
        substitute_name_length,
    )
    .ok()?;
    let print_name = read_utf16le_string(
        bytes,
        path_buffer_base + print_name_offset,
        print_name_length,
    )
    .ok()?;

    Some(ReparsePoint {
        reparse_tag,
        substitute_name: strip_nt_namespace_prefix(&substitute_name).to_string(),
        print_name,
    })
}

/// Dispatches on attribute type to decode the type-specific body. Resident
/// content is decoded eagerly; non-resident `$DATA`/`$INDEX_ALLOCATION`
/// content has no fixed-shape body to decode here, so they resolve to a
/// marker variant and are handled by the stream/index walkers directly.
pub fn parse_attribute_body(
    type_code: u32,
    content: &AttributeContent,
    record_data: &[u8],
    attr_offset: usize,
) -> AttributeBody {
    let resident_bytes = match content {
        AttributeContent::Resident(bytes) => Some(bytes.as_slice()),
        AttributeContent::NonResident { .. } => None,
    };

    match type_code {
        t if t == ATTR_TYPE_STANDARD_INFORMATION => resident_bytes
            .and_then(parse_standard_information)
            .map(AttributeBody::StandardInfo)
            .unwrap_or(AttributeBody::Unknown(type_code)),
        t if t == ATTR_TYPE_ATTRIBUTE_LIST => resident_bytes
            .and_then(|b| parse_attribute_list(b).ok())
            .map(AttributeBody::AttributeList)
            .unwrap_or(AttributeBody::Unknown(type_code)),
        t if t == ATTR_TYPE_FILE_NAME => resident_bytes
            .and_then(parse_file_name)
            .map(AttributeBody::FileName)
            .unwrap_or(AttributeBody::Unknown(type_code)),
        t if t == ATTR_TYPE_INDEX_ROOT => resident_bytes
            .and_then(|b| parse_index_root(b).ok())
            .map(AttributeBody::IndexRoot)
            .unwrap_or(AttributeBody::Unknown(type_code)),
        t if t == ATTR_TYPE_INDEX_ALLOCATION => AttributeBody::IndexAllocation,
        t if t == ATTR_TYPE_REPARSE_POINT => resident_bytes
            .and_then(parse_reparse_point)
            .map(AttributeBody::ReparsePoint)
            .unwrap_or(AttributeBody::Unknown(type_code)),
        t if t == crate::structures::ATTR_TYPE_DATA => AttributeBody::Data,
        other => {
            let _ = (record_data, attr_offset);
            AttributeBody::Unknown(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_information_timestamps_and_attributes() {
        let mut bytes = vec![0u8; 0x30];
        bytes[0x00..0x08].copy_from_slice(&100u64.to_le_bytes());
        bytes[0x20..0x24].copy_from_slice(&0x20u32.to_le_bytes()); // FILE_ATTRIBUTE_ARCHIVE

        let si = parse_standard_information(&bytes).unwrap();
        assert_eq!(si.created, 100);
        assert_eq!(si.file_attributes, 0x20);
    }

    #[test]
    fn parses_file_name_with_namespace_and_name() {
        let name = "hello.txt";
        let name_units: Vec<u8> = name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let mut bytes = vec![0u8; 0x42 + name_units.len()];
        bytes[0x00..0x08].copy_from_slice(&FileReference::from(5u64).record_number.to_le_bytes());
        bytes[0x30..0x38].copy_from_slice(&9u64.to_le_bytes()); // real_size
        bytes[0x40] = name.encode_utf16().count() as u8;
        bytes[0x41] = 0x01; // WIN32
        bytes[0x42..0x42 + name_units.len()].copy_from_slice(&name_units);

        let fna = parse_file_name(&bytes).unwrap();
        assert_eq!(fna.name, "hello.txt");
        assert_eq!(fna.namespace, 0x01);
        assert_eq!(fna.real_size, 9);
    }

    #[test]
    fn reparse_point_strips_nt_namespace_and_drive_letter() {
        let substitute = r"\??\C:\Target";
        let print = r"C:\Target";
        let sub_units: Vec<u8> = substitute
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let print_units: Vec<u8> = print.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();

        let mut bytes = vec![0u8; 0x10];
        bytes[0x00..0x04].copy_from_slice(&0xA0000003u32.to_le_bytes()); // SYMLINK tag, no quirk
        bytes[0x08..0x0A].copy_from_slice(&0u16.to_le_bytes()); // substitute offset
        bytes[0x0A..0x0C].copy_from_slice(&(sub_units.len() as u16).to_le_bytes());
        bytes[0x0C..0x0E].copy_from_slice(&(sub_units.len() as u16).to_le_bytes()); // print offset
        bytes[0x0E..0x10].copy_from_slice(&(print_units.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&sub_units);
        bytes.extend_from_slice(&print_units);

        let rp = parse_reparse_point(&bytes).unwrap();
        assert_eq!(rp.substitute_name, "Target");
        assert_eq!(rp.print_name, r"C:\Target");
    }

    #[test]
    fn mount_point_quirk_extends_substitute_length_by_four_bytes() {
        // No NT-namespace prefix here: this test is about the data-base and
        // length-extension logic, not the prefix strip (covered above).
        let substitute = r"Volume{abc}\";
        let sub_units: Vec<u8> = substitute
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let declared_len = sub_units.len() as u16;
        let mut padded_buffer = sub_units.clone();
        padded_buffer.extend_from_slice(&[0u8; 4]); // quirk: 4 extra bytes not in declared_len

        let data_base = 0x08;
        let path_buffer_base = data_base + 0x08;
        let mut bytes = vec![0u8; path_buffer_base];
        bytes[0x00..0x04].copy_from_slice(&REPARSE_TAG_MOUNT_POINT_QUIRK.to_le_bytes());
        bytes[data_base..data_base + 2].copy_from_slice(&0u16.to_le_bytes()); // substitute offset
        bytes[data_base + 2..data_base + 4].copy_from_slice(&declared_len.to_le_bytes());
        bytes[data_base + 4..data_base + 6]
            .copy_from_slice(&(padded_buffer.len() as u16).to_le_bytes()); // print offset
        bytes[data_base + 6..data_base + 8].copy_from_slice(&0u16.to_le_bytes()); // print length
        bytes.extend_from_slice(&padded_buffer);

        let rp = parse_reparse_point(&bytes).unwrap();
        assert_eq!(rp.reparse_tag, REPARSE_TAG_MOUNT_POINT_QUIRK);
        assert_eq!(rp.substitute_name, r"Volume{abc}\");
    }
}
