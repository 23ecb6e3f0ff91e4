//! B+-tree directory/reparse index parsing: `$I30` and `$R` entry layouts
//! and recursive `$INDEX_ALLOCATION` descent (§4.10).

use crate::error::{NtfsError, Result};
use crate::file_record::FileReference;
use crate::fixup::apply_fixup;
use crate::primitive::{read_u16, read_u32, read_u64, read_u8, read_utf16le_string};
use crate::runlist::{vcn_to_extent, DataRun};
use crate::structures::{INDEX_BLOCK_SIGNATURE, INDEX_ENTRY_END, INDEX_ENTRY_NODE};

const I30_FILENAME_OFFSET: usize = 0x52;

/// A `$I30` (filename) index entry.
#[derive(Debug, Clone)]
pub struct FileNameIndexEntry {
    pub file_reference: FileReference,
    pub file_name: String,
    pub filename_namespace: u8,
    pub real_size: u64,
    pub subnode_vcn: Option<u64>,
}

/// A `$R` (reparse) index entry.
#[derive(Debug, Clone)]
pub struct ReparseIndexEntry {
    pub reparse_tag: u32,
    pub file_reference: FileReference,
    pub subnode_vcn: Option<u64>,
}

/// Root index header, common to `$INDEX_ROOT` and each `$INDEX_ALLOCATION`
/// node (§4.10).
#[derive(Debug, Clone, Copy)]
pub struct IndexHeader {
    pub first_entry_offset: u32,
    pub total_size: u32,
    pub is_large_index: bool,
}

fn parse_index_header(data: &[u8], offset: usize) -> Result<IndexHeader> {
    let first_entry_offset = read_u32(data, offset)?;
    let total_size = read_u32(data, offset + 0x04)?;
    let flags = read_u32(data, offset + 0x0C)?;
    Ok(IndexHeader {
        first_entry_offset,
        total_size,
        is_large_index: flags & 0x01 != 0,
    })
}

/// Parses `$I30`-layout entries out of an index node's entry region.
/// Entries begin at `base + header.first_entry_offset`.
pub fn parse_filename_entries(
    data: &[u8],
    base: usize,
    header: &IndexHeader,
) -> Result<Vec<FileNameIndexEntry>> {
    let mut entries = Vec::new();
    let start = base + header.first_entry_offset as usize;
    let end = (start + header.total_size as usize).min(data.len());
    let mut offset = start;

    while offset + 0x10 <= end {
        let file_reference = FileReference::from(read_u64(data, offset)?);
        let entry_length = read_u16(data, offset + 0x08)? as usize;
        let index_flags = read_u8(data, offset + 0x0C)? as u16;

        if entry_length == 0 || offset + entry_length > data.len() {
            break;
        }

        let subnode_vcn = if index_flags & INDEX_ENTRY_NODE != 0 {
            Some(read_u64(data, offset + entry_length - 8)?)
        } else {
            None
        };

        if index_flags & INDEX_ENTRY_END != 0 {
            // Terminator entry carries no filename payload.
            offset += entry_length;
            continue;
        }

        let real_size = read_u64(data, offset + 0x40)?;
        let filename_namespace = read_u8(data, offset + 0x51)?;
        let filename_length_units = read_u8(data, offset + 0x50)? as usize;
        // The declared offset-to-filename field is unreliable in practice;
        // the filename always lands at a fixed offset (§9 open question).
        let file_name =
            read_utf16le_string(data, offset + I30_FILENAME_OFFSET, filename_length_units * 2)?;

        entries.push(FileNameIndexEntry {
            file_reference,
            file_name,
            filename_namespace,
            real_size,
            subnode_vcn,
        });

        offset += entry_length;
    }

    Ok(entries)
}

/// Parses `$R`-layout entries out of an index node's entry region.
pub fn parse_reparse_entries(
    data: &[u8],
    base: usize,
    header: &IndexHeader,
) -> Result<Vec<ReparseIndexEntry>> {
    let mut entries = Vec::new();
    let start = base + header.first_entry_offset as usize;
    let end = (start + header.total_size as usize).min(data.len());
    let mut offset = start;

    while offset + 0x14 <= end {
        let entry_size = read_u16(data, offset + 0x08)? as usize;
        let flags = read_u16(data, offset + 0x0C)?;

        if entry_size == 0 || offset + entry_size > data.len() {
            break;
        }

        let reparse_tag = read_u32(data, offset + 0x10)?;
        let file_reference = FileReference::from(read_u64(data, offset + 0x14)?);

        let subnode_vcn = if flags & 0x01 != 0 {
            Some(read_u32(data, offset + 0x20)? as u64)
        } else {
            None
        };

        entries.push(ReparseIndexEntry {
            reparse_tag,
            file_reference,
            subnode_vcn,
        });

        if flags & 0x02 != 0 {
            break;
        }

        offset += entry_size;
    }

    Ok(entries)
}

/// `$INDEX_ROOT` attribute content (always resident): embeds the root node
/// directly and records the index-record size used by `$INDEX_ALLOCATION`.
#[derive(Debug, Clone)]
pub struct IndexRoot {
    pub attribute_type: u32,
    pub index_block_size: u32,
    pub header: IndexHeader,
    pub filename_entries: Vec<FileNameIndexEntry>,
    pub reparse_entries: Vec<ReparseIndexEntry>,
}

/// Parses an `$INDEX_ROOT` attribute. Per §4.10's quirk, the root's entry
/// layout is always `$I30`-shaped regardless of the attribute's own name —
/// only `$INDEX_ALLOCATION` distinguishes `$R` from `$I30`.
pub fn parse_index_root(data: &[u8]) -> Result<IndexRoot> {
    if data.len() < 0x20 {
        return Err(NtfsError::InvalidAttribute(
            "INDEX_ROOT shorter than its fixed header".to_string(),
        ));
    }
    let attribute_type = read_u32(data, 0x00)?;
    let index_block_size = read_u32(data, 0x08)?;
    let header = parse_index_header(data, 0x10)?;
    // `first_entry_offset` is relative to the start of this header (0x10),
    // not the start of the attribute.
    let filename_entries = parse_filename_entries(data, 0x10, &header)?;

    Ok(IndexRoot {
        attribute_type,
        index_block_size,
        header,
        filename_entries,
        reparse_entries: Vec::new(),
    })
}

/// One `"INDX"` node fetched and fixed up from `$INDEX_ALLOCATION`.
pub fn parse_index_allocation_node(
    mut block: Vec<u8>,
    bytes_per_sector: usize,
) -> Result<(IndexHeader, Vec<u8>)> {
    if block.len() < 24 || &block[0..4] != INDEX_BLOCK_SIGNATURE {
        return Err(NtfsError::InvalidAttribute(
            "INDEX_ALLOCATION node missing INDX signature".to_string(),
        ));
    }

    let usa_offset = read_u16(&block, 0x04)? as usize;
    let usa_count = read_u16(&block, 0x06)? as usize;
    apply_fixup(&mut block, usa_offset, usa_count, bytes_per_sector);

    let node_header_offset = 0x18;
    let header = parse_index_header(&block, node_header_offset)?;
    Ok((header, block))
}

/// Locates the byte offset of VCN `vcn` within an `$INDEX_ALLOCATION`
/// runlist. The subnode VCN recorded in an index entry is already a cluster
/// VCN, not an index-record count, so it translates directly (§4.10).
pub fn index_record_offset(runlist: &[DataRun], vcn: u64, cluster_bytes: u64) -> Option<u64> {
    let (run, rel) = vcn_to_extent(runlist, vcn)?;
    Some((run.lcn + rel) * cluster_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_i30_entry(
        buf: &mut Vec<u8>,
        file_ref: u64,
        name: &str,
        namespace: u8,
        flags: u16,
        subnode_vcn: Option<u64>,
    ) {
        let name_bytes: Vec<u8> = name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let fixed_len = 0x52 + name_bytes.len();
        let entry_len = fixed_len + if subnode_vcn.is_some() { 8 } else { 0 };
        let entry_len = (entry_len + 7) / 8 * 8;

        let start = buf.len();
        buf.resize(start + entry_len, 0);
        buf[start..start + 8].copy_from_slice(&file_ref.to_le_bytes());
        buf[start + 8..start + 10].copy_from_slice(&(entry_len as u16).to_le_bytes());
        buf[start + 12] = flags as u8;
        buf[start + 0x40..start + 0x48].copy_from_slice(&1024u64.to_le_bytes());
        buf[start + 0x50] = name.encode_utf16().count() as u8;
        buf[start + 0x51] = namespace;
        buf[start + 0x52..start + 0x52 + name_bytes.len()].copy_from_slice(&name_bytes);

        if let Some(vcn) = subnode_vcn {
            let tail = start + entry_len - 8;
            buf[tail..tail + 8].copy_from_slice(&vcn.to_le_bytes());
        }
    }

    #[test]
    fn parses_leaf_and_internal_entries() {
        let mut entries_region = Vec::new();
        push_i30_entry(&mut entries_region, 100, "a", 1, 0, None);
        push_i30_entry(&mut entries_region, 200, "b", 1, INDEX_ENTRY_NODE, Some(4));
        // Terminator.
        let term_start = entries_region.len();
        entries_region.resize(term_start + 0x10, 0);
        entries_region[term_start + 8..term_start + 10].copy_from_slice(&0x10u16.to_le_bytes());
        entries_region[term_start + 12] = INDEX_ENTRY_END as u8;

        let mut data = vec![0u8; 0x20];
        data.extend(entries_region);

        let header = IndexHeader {
            first_entry_offset: 0,
            total_size: (data.len() - 0x20) as u32,
            is_large_index: true,
        };

        let entries = parse_filename_entries(&data, 0x20, &header).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_name, "a");
        assert_eq!(entries[0].subnode_vcn, None);
        assert_eq!(entries[1].file_name, "b");
        assert_eq!(entries[1].subnode_vcn, Some(4));
    }

    #[test]
    fn index_root_treats_its_entries_as_i30_regardless_of_name() {
        let mut root = vec![0u8; 0x20];
        root[0x00..0x04].copy_from_slice(&0x30u32.to_le_bytes()); // FILE_NAME collation
        root[0x08..0x0C].copy_from_slice(&4096u32.to_le_bytes());
        root[0x10..0x14].copy_from_slice(&0u32.to_le_bytes()); // first_entry_offset
        root[0x14..0x18].copy_from_slice(&0u32.to_le_bytes()); // total_size = 0 -> no entries

        let parsed = parse_index_root(&root).unwrap();
        assert_eq!(parsed.attribute_type, 0x30);
        assert!(parsed.filename_entries.is_empty());
    }

    #[test]
    fn vcn_translates_to_index_record_byte_offset() {
        let runlist = vec![DataRun {
            lcn: 1000,
            n_clusters: 16,
        }];
        // The subnode VCN is a cluster VCN already; it is not scaled by
        // clusters-per-index-record even when the index record spans several
        // clusters (e.g. 4096-byte records on 1024-byte clusters).
        let offset = index_record_offset(&runlist, 1, 1024).unwrap();
        assert_eq!(offset, (1000 + 1) * 1024);
    }
}
