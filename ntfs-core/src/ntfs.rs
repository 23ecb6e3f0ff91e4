//! Top-level entry point tying volume geometry, the MFT resolver, and path
//! resolution together into one handle over an opened image.

use crate::boot::{parse_boot_sector, VolumeGeometry};
use crate::byte_source::{ByteSource, FileSource, MmapSource};
use crate::error::{NtfsError, Result};
use crate::file_record::{AttributeContent, FileRecord};
use crate::mft::MftResolver;
use crate::path_resolver::{list_directory_entries, resolve_path};
use crate::stream::DataStream;
use crate::structures::ATTR_TYPE_DATA;
use std::path::Path;

/// An opened, read-only NTFS volume.
pub struct Ntfs {
    source: Box<dyn ByteSource>,
}

impl Ntfs {
    /// Opens `path` with a copy-on-write memory mapping, the default and
    /// fastest source.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            source: Box::new(MmapSource::open(path)?),
        })
    }

    /// Opens `path` through ordinary seek+read, for devices or platforms
    /// where memory-mapping the whole volume is undesirable.
    pub fn open_unmapped(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            source: Box::new(FileSource::open(path)?),
        })
    }

    fn geometry(&self) -> Result<VolumeGeometry> {
        parse_boot_sector(self.source.as_ref())
    }

    fn resolver(&self) -> Result<MftResolver<'_>> {
        let geometry = self.geometry()?;
        MftResolver::bootstrap(self.source.as_ref(), geometry)
    }

    /// Fetches and parses one file record by its MFT record number. Returns
    /// `None` if `record_number` doesn't name a live record (§4.7).
    pub fn file_record(&self, record_number: u64) -> Result<Option<FileRecord>> {
        self.resolver()?.get_file_record(record_number)
    }

    /// Resolves a `/`-separated path from the volume root, following
    /// reparse points along the way. Returns `None` if any path component
    /// doesn't resolve to a live record.
    pub fn file_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let resolver = self.resolver()?;
        resolve_path(&resolver, path)
    }

    /// Opens a streaming reader over a file record's unnamed `$DATA`
    /// content. A large file that overflowed into `$ATTRIBUTE_LIST`
    /// fragments may carry several non-resident `$DATA` attributes with
    /// ascending `start_vcn`; these are joined into one continuous stream
    /// (§4.12).
    pub fn open_data_stream<'a>(&'a self, record: &'a FileRecord) -> Result<DataStream<'a>> {
        let geometry = self.geometry()?;
        let mut data_attrs: Vec<_> = record
            .attributes
            .iter()
            .filter(|a| a.type_code == ATTR_TYPE_DATA && a.name.is_none())
            .collect();

        if data_attrs.is_empty() {
            return Err(NtfsError::InvalidAttribute(
                "record has no unnamed $DATA".to_string(),
            ));
        }

        if data_attrs.len() > 1 {
            data_attrs.sort_by_key(|a| match &a.content {
                AttributeContent::NonResident { start_vcn, .. } => *start_vcn,
                AttributeContent::Resident(_) => 0,
            });

            let first_starts_at_zero = matches!(
                &data_attrs[0].content,
                AttributeContent::NonResident { start_vcn: 0, .. }
            );
            if !first_starts_at_zero {
                return Err(NtfsError::InvalidAttribute(
                    "split $DATA stream is missing its start_vcn == 0 fragment".to_string(),
                ));
            }
        }

        let parts: Vec<_> = data_attrs.iter().map(|a| &a.content).collect();
        Ok(DataStream::from_parts(self.source.as_ref(), geometry, parts))
    }

    /// Lists the immediate children of a directory record, reading both
    /// `$INDEX_ROOT` and any `$INDEX_ALLOCATION` nodes.
    pub fn list_directory(&self, record: &FileRecord) -> Result<Vec<(String, u64)>> {
        let resolver = self.resolver()?;
        let entries = list_directory_entries(&resolver, record)?;
        Ok(entries
            .into_iter()
            .map(|e| (e.file_name, e.file_reference.record_number))
            .collect())
    }
}
