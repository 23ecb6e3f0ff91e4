//! Master File Table resolver: bootstraps from the boot sector's MFT
//! location, decodes `$MFT`'s own runlist, and serves individual file
//! records by number, transparently merging `$ATTRIBUTE_LIST` fragments
//! spread across sibling records (§4.7, §4.9).

use crate::attrdef::AttrDef;
use crate::attribute_list::referenced_record_numbers;
use crate::attributes::AttributeBody;
use crate::boot::VolumeGeometry;
use crate::byte_source::ByteSource;
use crate::error::{NtfsError, Result};
use crate::file_record::{parse_file_record, FileRecord};
use crate::fixup::apply_fixup;
use crate::primitive::read_u16;
use crate::runlist::{vcn_to_extent, DataRun};
use crate::structures::{MFT_RECORD_BAD_SIGNATURE, MFT_RECORD_SIGNATURE};
use log::{debug, warn};

/// Resolves MFT record numbers to parsed [`FileRecord`]s.
pub struct MftResolver<'a> {
    source: &'a dyn ByteSource,
    geometry: VolumeGeometry,
    mft_runlist: Vec<DataRun>,
    attrdef: AttrDef,
}

impl<'a> MftResolver<'a> {
    /// Bootstraps by reading `$MFT`'s own (record 0) header directly at the
    /// boot-sector-declared MFT start offset, decoding its `$DATA` runlist
    /// so subsequent records can come from anywhere on the volume, then
    /// using that runlist to fetch and decode `$AttrDef` (record 4).
    pub fn bootstrap(source: &'a dyn ByteSource, geometry: VolumeGeometry) -> Result<Self> {
        let mft_start = geometry.mft_start_offset();
        let raw = source.read(mft_start, geometry.file_record_size as u64)?;

        let mut record0 = raw;
        let usa_offset = read_u16(&record0, 0x04)? as usize;
        let usa_count = read_u16(&record0, 0x06)? as usize;
        apply_fixup(
            &mut record0,
            usa_offset,
            usa_count,
            geometry.bytes_per_sector as usize,
        );

        if &record0[0..4] != MFT_RECORD_SIGNATURE {
            return Err(NtfsError::MftInitFailed(
                "record 0 is not a valid FILE record".to_string(),
            ));
        }

        // AttrDef isn't known yet, so names fall back to "UNKNOWN(0x..)" —
        // look the $DATA attribute up by its well-known type code instead.
        let placeholder_attrdef = AttrDef::default();
        let parsed = parse_file_record(0, &record0, &placeholder_attrdef)?;

        let data_attr = parsed
            .attributes
            .iter()
            .find(|a| a.type_code == crate::structures::ATTR_TYPE_DATA)
            .ok_or_else(|| NtfsError::MftInitFailed("$MFT record has no $DATA".to_string()))?;

        let runlist = match &data_attr.content {
            crate::file_record::AttributeContent::NonResident { runlist, .. } => runlist.clone(),
            crate::file_record::AttributeContent::Resident(_) => {
                return Err(NtfsError::MftInitFailed(
                    "$MFT $DATA must be non-resident".to_string(),
                ))
            }
        };

        let attrdef = bootstrap_attrdef(source, &geometry, &runlist)?;

        Ok(Self {
            source,
            geometry,
            mft_runlist: runlist,
            attrdef,
        })
    }

    /// Reads the raw, fixed-up bytes for one MFT record. Returns `Ok(None)`
    /// when `record_number` falls outside the MFT runlist or the record's
    /// signature isn't a valid `FILE` record — both are absent-value
    /// conditions, not errors (§4.7, §7). Genuine I/O/truncation failures
    /// still propagate as `Err`.
    fn read_record_bytes(&self, record_number: u64) -> Result<Option<Vec<u8>>> {
        let records_per_cluster =
            (self.geometry.cluster_bytes() / self.geometry.file_record_size as u64).max(1);
        let vcn = record_number / records_per_cluster;
        let Some((run, cluster_rel)) = vcn_to_extent(&self.mft_runlist, vcn) else {
            debug!("MFT record {record_number} (vcn {vcn}) exceeds the MFT runlist");
            return Ok(None);
        };

        let lcn = run.lcn + cluster_rel;
        let cluster_offset = self.geometry.lcn_to_offset(lcn);
        let within_cluster = (record_number % records_per_cluster)
            * self.geometry.file_record_size as u64;
        let offset = cluster_offset + within_cluster;

        let mut raw = self
            .source
            .read(offset, self.geometry.file_record_size as u64)?;

        if &raw[0..4] == MFT_RECORD_BAD_SIGNATURE {
            warn!("MFT record {record_number} marked BAAD");
            return Ok(None);
        }
        if &raw[0..4] != MFT_RECORD_SIGNATURE {
            debug!("MFT record {record_number} missing FILE signature");
            return Ok(None);
        }

        let usa_offset = read_u16(&raw, 0x04)? as usize;
        let usa_count = read_u16(&raw, 0x06)? as usize;
        apply_fixup(
            &mut raw,
            usa_offset,
            usa_count,
            self.geometry.bytes_per_sector as usize,
        );

        Ok(Some(raw))
    }

    /// Fetches and fully parses a file record, resolving any
    /// `$ATTRIBUTE_LIST` fragments held in sibling records. Returns `None`
    /// if `record_number` doesn't name a live record (§4.7).
    pub fn get_file_record(&self, record_number: u64) -> Result<Option<FileRecord>> {
        let Some(raw) = self.read_record_bytes(record_number)? else {
            return Ok(None);
        };
        let mut record = parse_file_record(record_number, &raw, &self.attrdef)?;

        let attribute_list_entries: Vec<_> = record
            .attributes
            .iter()
            .filter_map(|a| match &a.body {
                AttributeBody::AttributeList(entries) => Some(entries.clone()),
                _ => None,
            })
            .collect();

        for entries in attribute_list_entries {
            let fragment_records = referenced_record_numbers(&entries, record_number);
            for fragment_number in fragment_records {
                match self.read_record_bytes(fragment_number) {
                    Ok(Some(fragment_raw)) => {
                        match parse_file_record(fragment_number, &fragment_raw, &self.attrdef) {
                            Ok(fragment) => record.extend_attributes(fragment.attributes),
                            Err(e) => warn!(
                                "failed to parse attribute-list fragment record {fragment_number}: {e}"
                            ),
                        }
                    }
                    Ok(None) => warn!(
                        "attribute-list fragment record {fragment_number} not found"
                    ),
                    Err(e) => warn!(
                        "failed to read attribute-list fragment record {fragment_number}: {e}"
                    ),
                }
            }
        }

        Ok(Some(record))
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn attrdef(&self) -> &AttrDef {
        &self.attrdef
    }

    pub fn source(&self) -> &dyn ByteSource {
        self.source
    }
}

/// Decodes `$AttrDef` (record 4) so the resolver can label attribute types
/// by name from then on. Called once during top-level `Ntfs` construction,
/// before `attrdef` on [`MftResolver`] is populated for real.
pub fn bootstrap_attrdef(
    source: &dyn ByteSource,
    geometry: &VolumeGeometry,
    mft_runlist: &[DataRun],
) -> Result<AttrDef> {
    let records_per_cluster =
        (geometry.cluster_bytes() / geometry.file_record_size as u64).max(1);
    let vcn = crate::structures::MFT_RECORD_ATTRDEF / records_per_cluster;
    let (run, cluster_rel) = vcn_to_extent(mft_runlist, vcn)
        .ok_or_else(|| NtfsError::InvalidRunlist("no extent covers $AttrDef vcn".to_string()))?;
    let lcn = run.lcn + cluster_rel;
    let cluster_offset = geometry.lcn_to_offset(lcn);
    let within_cluster = (crate::structures::MFT_RECORD_ATTRDEF % records_per_cluster)
        * geometry.file_record_size as u64;
    let offset = cluster_offset + within_cluster;

    let mut raw = source.read(offset, geometry.file_record_size as u64)?;
    let usa_offset = read_u16(&raw, 0x04)? as usize;
    let usa_count = read_u16(&raw, 0x06)? as usize;
    apply_fixup(&mut raw, usa_offset, usa_count, geometry.bytes_per_sector as usize);

    let placeholder = AttrDef::default();
    let record = parse_file_record(crate::structures::MFT_RECORD_ATTRDEF, &raw, &placeholder)?;

    let data_attr = record
        .attributes
        .iter()
        .find(|a| a.type_code == crate::structures::ATTR_TYPE_DATA)
        .ok_or_else(|| {
            NtfsError::MftInitFailed("$AttrDef record has no $DATA attribute".to_string())
        })?;

    let bytes = match &data_attr.content {
        crate::file_record::AttributeContent::Resident(bytes) => bytes.clone(),
        crate::file_record::AttributeContent::NonResident { runlist, real_size, .. } => {
            let mut buf = Vec::with_capacity(*real_size as usize);
            for run in runlist {
                let extent_offset = geometry.lcn_to_offset(run.lcn);
                let extent_len = run.n_clusters * geometry.cluster_bytes();
                buf.extend(source.read(extent_offset, extent_len)?);
            }
            buf.truncate(*real_size as usize);
            buf
        }
    };

    AttrDef::parse(&bytes)
}
