//! Lazy, pull-based reader over a file's `$DATA` content, joining resident
//! bytes and multi-extent non-resident runlists transparently (§4.11).

use crate::boot::VolumeGeometry;
use crate::byte_source::ByteSource;
use crate::error::Result;
use crate::file_record::AttributeContent;

/// Reads are served in chunks no larger than this, regardless of how large
/// a contiguous extent is, so callers streaming a huge file never force one
/// giant allocation.
pub const MAX_CHUNK_BYTES: u64 = 100 * 1024 * 1024;

/// A cursor over a file's `$DATA` content, yielding successive chunks until
/// exhausted. Usually backed by a single attribute, but a large file that
/// overflowed into `$ATTRIBUTE_LIST` fragments may split its `$DATA` across
/// several non-resident attributes with ascending `start_vcn`; `from_parts`
/// joins them into one continuous stream (§4.12).
pub struct DataStream<'a> {
    source: &'a dyn ByteSource,
    geometry: VolumeGeometry,
    parts: Vec<&'a AttributeContent>,
    position: u64,
    declared_size: u64,
}

impl<'a> DataStream<'a> {
    pub fn new(source: &'a dyn ByteSource, geometry: VolumeGeometry, content: &'a AttributeContent) -> Self {
        Self::from_parts(source, geometry, vec![content])
    }

    /// Builds a stream over one or more `$DATA` parts, already ordered by
    /// ascending `start_vcn`. Every non-resident fragment of a split stream
    /// declares the same `real_size`, so the declared size is taken from
    /// whichever part comes first.
    pub fn from_parts(
        source: &'a dyn ByteSource,
        geometry: VolumeGeometry,
        parts: Vec<&'a AttributeContent>,
    ) -> Self {
        let declared_size = parts
            .first()
            .map(|content| match content {
                AttributeContent::Resident(bytes) => bytes.len() as u64,
                AttributeContent::NonResident { real_size, .. } => *real_size,
            })
            .unwrap_or(0);
        Self {
            source,
            geometry,
            parts,
            position: 0,
            declared_size,
        }
    }

    pub fn total_size(&self) -> u64 {
        if self.declared_size != 0 {
            return self.declared_size;
        }
        // Some records declare a zero real_size despite a populated
        // runlist; fall back to the summed runlist extent.
        self.parts
            .iter()
            .map(|content| match content {
                AttributeContent::Resident(bytes) => bytes.len() as u64,
                AttributeContent::NonResident { runlist, .. } => {
                    runlist.iter().map(|r| r.n_clusters).sum::<u64>() * self.geometry.cluster_bytes()
                }
            })
            .sum()
    }

    /// Pulls the next chunk, up to [`MAX_CHUNK_BYTES`], or `None` at EOF.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let total = self.total_size();
        if self.position >= total {
            return Ok(None);
        }

        let remaining = total - self.position;
        let want = remaining.min(MAX_CHUNK_BYTES);

        let chunk = if let [AttributeContent::Resident(bytes)] = self.parts.as_slice() {
            let start = self.position as usize;
            let end = (start + want as usize).min(bytes.len());
            bytes[start..end].to_vec()
        } else {
            self.read_non_resident(self.position, want)?
        };

        self.position += chunk.len() as u64;
        Ok(Some(chunk))
    }

    /// Finds the non-resident part whose `[start_vcn, last_vcn]` range
    /// covers `global_vcn`, returning its runlist and its own `start_vcn`
    /// (runlists are VCN-addressed relative to their own part, not the
    /// file as a whole).
    fn part_runlist_at(&self, global_vcn: u64) -> Option<(&'a [crate::runlist::DataRun], u64)> {
        self.parts.iter().find_map(|content| match content {
            AttributeContent::NonResident {
                runlist,
                start_vcn,
                last_vcn,
                ..
            } if global_vcn >= *start_vcn && global_vcn <= *last_vcn => {
                Some((runlist.as_slice(), *start_vcn))
            }
            _ => None,
        })
    }

    fn read_non_resident(&self, byte_offset: u64, want: u64) -> Result<Vec<u8>> {
        let cluster_bytes = self.geometry.cluster_bytes();
        let mut out = Vec::with_capacity(want as usize);
        let mut remaining = want;
        let mut cursor = byte_offset;

        while remaining > 0 {
            let global_vcn = cursor / cluster_bytes;
            let within_cluster = cursor % cluster_bytes;

            let Some((runlist, part_start_vcn)) = self.part_runlist_at(global_vcn) else {
                break;
            };
            let local_vcn = global_vcn - part_start_vcn;

            let Some((run, rel)) = crate::runlist::vcn_to_extent(runlist, local_vcn) else {
                break;
            };

            let extent_start = self.geometry.lcn_to_offset(run.lcn) + rel * cluster_bytes;
            let extent_remaining_clusters = run.n_clusters - rel;
            let extent_remaining_bytes = extent_remaining_clusters * cluster_bytes - within_cluster;

            let take = remaining.min(extent_remaining_bytes);
            let bytes = self.source.read(extent_start + within_cluster, take)?;
            out.extend_from_slice(&bytes);

            remaining -= take;
            cursor += take;
        }

        Ok(out)
    }

    /// Drains the remainder of the stream into a single buffer. Intended
    /// for CLI `--fetch-file` use where the whole content is wanted; large
    /// automated consumers should prefer [`Self::next_chunk`].
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.next_chunk()? {
            buf.extend(chunk);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::BufferSource;
    use crate::runlist::DataRun;

    fn geometry() -> VolumeGeometry {
        VolumeGeometry {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            lcn_of_mft: 0,
            file_record_size: 1024,
        }
    }

    #[test]
    fn resident_stream_yields_single_chunk() {
        let geom = geometry();
        let source = BufferSource::new(vec![0u8; 16]);
        let content = AttributeContent::Resident(b"hello world".to_vec());
        let mut stream = DataStream::new(&source, geom, &content);
        let chunk = stream.next_chunk().unwrap().unwrap();
        assert_eq!(chunk, b"hello world");
        assert!(stream.next_chunk().unwrap().is_none());
    }

    #[test]
    fn non_resident_stream_reads_across_extent() {
        let geom = geometry();
        let mut backing = vec![0u8; 4096];
        backing[512..512 + 5].copy_from_slice(b"abcde");
        let source = BufferSource::new(backing);

        let content = AttributeContent::NonResident {
            runlist: vec![DataRun {
                lcn: 1,
                n_clusters: 4,
            }],
            start_vcn: 0,
            last_vcn: 3,
            real_size: 5,
        };

        let mut stream = DataStream::new(&source, geom, &content);
        let chunk = stream.read_to_end().unwrap();
        assert_eq!(chunk, b"abcde");
    }

    #[test]
    fn joins_split_non_resident_parts_in_order() {
        let geom = geometry();
        let mut backing = vec![0u8; 4096];
        backing[512..516].copy_from_slice(b"ABCD");
        backing[1536..1540].copy_from_slice(b"WXYZ");
        let source = BufferSource::new(backing);

        let part1 = AttributeContent::NonResident {
            runlist: vec![DataRun {
                lcn: 1,
                n_clusters: 1,
            }],
            start_vcn: 0,
            last_vcn: 0,
            real_size: 512 + 4,
        };
        let part2 = AttributeContent::NonResident {
            runlist: vec![DataRun {
                lcn: 3,
                n_clusters: 1,
            }],
            start_vcn: 1,
            last_vcn: 1,
            real_size: 512 + 4,
        };

        let mut stream = DataStream::from_parts(&source, geom, vec![&part1, &part2]);
        let data = stream.read_to_end().unwrap();
        assert_eq!(data.len(), 516);
        assert_eq!(&data[0..4], b"ABCD");
        assert_eq!(&data[512..516], b"WXYZ");
    }

    #[test]
    fn falls_back_to_runlist_extent_when_real_size_is_zero() {
        let geom = geometry();
        let source = BufferSource::new(vec![0u8; 4096]);
        let content = AttributeContent::NonResident {
            runlist: vec![DataRun {
                lcn: 0,
                n_clusters: 2,
            }],
            start_vcn: 0,
            last_vcn: 1,
            real_size: 0,
        };
        let stream = DataStream::new(&source, geom, &content);
        assert_eq!(stream.total_size(), 2 * geometry().cluster_bytes());
    }
}
