//! Path resolution from the volume root (record #5), walking `$I30`
//! directory indexes and following reparse points (§4.12).

use crate::attributes::AttributeBody;
use crate::error::{NtfsError, Result};
use crate::file_record::FileRecord;
use crate::index::{
    index_record_offset, parse_filename_entries, parse_index_allocation_node, FileNameIndexEntry,
};
use crate::mft::MftResolver;
use crate::structures::{FILE_NAME_DOS, MFT_RECORD_ROOT};
use log::warn;

/// Directory-entry cap followed per reparse hop, guarding against reparse
/// point cycles (mount point pointing at an ancestor, self-referential
/// junction, etc).
const MAX_REPARSE_HOPS: usize = 16;

/// Resolves an absolute, backslash-separated path to the [`FileRecord`] it
/// names, starting from the volume root directory. Returns `None` if any
/// path component doesn't resolve to a live record.
pub fn resolve_path(resolver: &MftResolver, path: &str) -> Result<Option<FileRecord>> {
    resolve_path_with_hops(resolver, path, 0)
}

fn resolve_path_with_hops(
    resolver: &MftResolver,
    path: &str,
    hops: usize,
) -> Result<Option<FileRecord>> {
    if hops > MAX_REPARSE_HOPS {
        return Err(NtfsError::InvalidAttribute(
            "too many reparse point hops; possible cycle".to_string(),
        ));
    }

    let Some(mut current) = resolver.get_file_record(MFT_RECORD_ROOT)? else {
        return Ok(None);
    };
    let components: Vec<&str> = path.split('\\').filter(|c| !c.is_empty()).collect();

    for (i, component) in components.iter().enumerate() {
        let Some(record_number) = find_in_directory(resolver, &current, component)? else {
            return Ok(None);
        };

        let Some(next) = resolver.get_file_record(record_number)? else {
            return Ok(None);
        };
        current = next;

        if let Some(reparse) = current
            .attributes
            .iter()
            .find_map(|a| match &a.body {
                AttributeBody::ReparsePoint(rp) => Some(rp.clone()),
                _ => None,
            })
        {
            let remainder = components[i + 1..].join("\\");
            let rebuilt = if remainder.is_empty() {
                reparse.substitute_name
            } else {
                format!("{}\\{}", reparse.substitute_name, remainder)
            };
            return resolve_path_with_hops(resolver, &rebuilt, hops + 1);
        }
    }

    Ok(Some(current))
}

/// Looks up `name` as a direct child of `dir`, searching `$INDEX_ROOT`
/// first and falling back to `$INDEX_ALLOCATION` for large directories.
fn find_in_directory(
    resolver: &MftResolver,
    dir: &FileRecord,
    name: &str,
) -> Result<Option<u64>> {
    let index_root = dir.attributes.iter().find_map(|a| match &a.body {
        AttributeBody::IndexRoot(root) => Some(root),
        _ => None,
    });

    let Some(index_root) = index_root else {
        return Ok(None);
    };

    if let Some(found) = find_name_matching(&index_root.filename_entries, name) {
        return Ok(Some(found));
    }

    if !index_root.header.is_large_index {
        return Ok(None);
    }

    let index_allocation = dir.attributes.iter().find(|a| {
        matches!(a.body, AttributeBody::IndexAllocation) && a.name.as_deref() == Some("$I30")
    });

    let Some(index_allocation) = index_allocation else {
        return Ok(None);
    };

    let runlist = match &index_allocation.content {
        crate::file_record::AttributeContent::NonResident { runlist, .. } => runlist,
        crate::file_record::AttributeContent::Resident(_) => return Ok(None),
    };

    let geometry = resolver.geometry();
    let cluster_bytes = geometry.cluster_bytes();
    let index_record_size = index_root.index_block_size as u64;

    let mut pending_vcns: Vec<u64> = vec![0];
    let mut visited = std::collections::HashSet::new();

    while let Some(vcn) = pending_vcns.pop() {
        if !visited.insert(vcn) {
            continue;
        }

        let Some(offset) = index_record_offset(runlist, vcn, cluster_bytes) else {
            continue;
        };

        let raw = resolver.source().read(offset, index_record_size)?;
        let (header, block) = match parse_index_allocation_node(raw, geometry.bytes_per_sector as usize) {
            Ok(v) => v,
            Err(e) => {
                warn!("skipping malformed INDX node at vcn {vcn}: {e}");
                continue;
            }
        };

        let entries = parse_filename_entries(&block, 0x18, &header)?;
        if let Some(found) = find_name_matching(&entries, name) {
            return Ok(Some(found));
        }

        for entry in &entries {
            if let Some(subnode_vcn) = entry.subnode_vcn {
                pending_vcns.push(subnode_vcn);
            }
        }
    }

    Ok(None)
}

/// Collects every `$I30` filename entry for a directory, walking
/// `$INDEX_ROOT` and the full `$INDEX_ALLOCATION` B+-tree if present.
pub fn list_directory_entries(
    resolver: &MftResolver,
    dir: &FileRecord,
) -> Result<Vec<FileNameIndexEntry>> {
    let index_root = dir.attributes.iter().find_map(|a| match &a.body {
        AttributeBody::IndexRoot(root) => Some(root),
        _ => None,
    });

    let Some(index_root) = index_root else {
        return Ok(Vec::new());
    };

    let mut entries = index_root.filename_entries.clone();

    if !index_root.header.is_large_index {
        return Ok(entries);
    }

    let index_allocation = dir.attributes.iter().find(|a| {
        matches!(a.body, AttributeBody::IndexAllocation) && a.name.as_deref() == Some("$I30")
    });

    let Some(index_allocation) = index_allocation else {
        return Ok(entries);
    };

    let runlist = match &index_allocation.content {
        crate::file_record::AttributeContent::NonResident { runlist, .. } => runlist,
        crate::file_record::AttributeContent::Resident(_) => return Ok(entries),
    };

    let geometry = resolver.geometry();
    let cluster_bytes = geometry.cluster_bytes();
    let index_record_size = index_root.index_block_size as u64;

    let mut pending_vcns: Vec<u64> = vec![0];
    let mut visited = std::collections::HashSet::new();

    while let Some(vcn) = pending_vcns.pop() {
        if !visited.insert(vcn) {
            continue;
        }

        let Some(offset) = index_record_offset(runlist, vcn, cluster_bytes) else {
            continue;
        };

        let raw = resolver.source().read(offset, index_record_size)?;
        let (header, block) =
            match parse_index_allocation_node(raw, geometry.bytes_per_sector as usize) {
                Ok(v) => v,
                Err(e) => {
                    warn!("skipping malformed INDX node at vcn {vcn}: {e}");
                    continue;
                }
            };

        let node_entries = parse_filename_entries(&block, 0x18, &header)?;
        for entry in &node_entries {
            if let Some(subnode_vcn) = entry.subnode_vcn {
                pending_vcns.push(subnode_vcn);
            }
        }
        entries.extend(node_entries);
    }

    Ok(entries)
}

fn find_name_matching(entries: &[FileNameIndexEntry], name: &str) -> Option<u64> {
    entries
        .iter()
        .find(|e| e.file_name.eq_ignore_ascii_case(name) && e.filename_namespace != FILE_NAME_DOS)
        .or_else(|| entries.iter().find(|e| e.file_name.eq_ignore_ascii_case(name)))
        .map(|e| e.file_reference.record_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_record::FileReference;

    fn entry(name: &str, record_number: u64, namespace: u8) -> FileNameIndexEntry {
        FileNameIndexEntry {
            file_reference: FileReference {
                record_number,
                sequence_number: 1,
            },
            file_name: name.to_string(),
            filename_namespace: namespace,
            real_size: 0,
            subnode_vcn: None,
        }
    }

    #[test]
    fn prefers_non_dos_namespace_match() {
        let entries = vec![entry("DOCUME~1", 10, FILE_NAME_DOS), entry("Documents", 10, 1)];
        assert_eq!(find_name_matching(&entries, "documents"), Some(10));
    }

    #[test]
    fn falls_back_to_dos_name_when_only_match() {
        let entries = vec![entry("DOCUME~1", 10, FILE_NAME_DOS)];
        assert_eq!(find_name_matching(&entries, "docume~1"), Some(10));
    }

    #[test]
    fn no_match_returns_none() {
        let entries = vec![entry("foo", 10, 1)];
        assert_eq!(find_name_matching(&entries, "bar"), None);
    }
}
