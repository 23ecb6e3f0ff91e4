//! Read-only NTFS volume parsing: boot sector, Master File Table, file
//! records and attributes, directory indexes, and file content streaming.

pub mod attrdef;
pub mod attribute_list;
pub mod attributes;
pub mod boot;
pub mod byte_source;
pub mod error;
pub mod file_record;
pub mod fixup;
pub mod index;
pub mod mft;
pub mod ntfs;
pub mod path_resolver;
pub mod primitive;
pub mod runlist;
pub mod stream;
pub mod structures;

pub use error::{NtfsError, Result};
pub use file_record::{Attribute, AttributeContent, FileRecord, FileReference};
pub use ntfs::Ntfs;
