use thiserror::Error;

/// Errors surfaced by the NTFS decoding engine.
///
/// `InvalidImage`, `Io`, `MftInitFailed` and `UnknownAttrType` (when it occurs
/// during `$AttrDef` bootstrap) are fatal: they abort volume construction.
/// Everything else that can go wrong while parsing an individual record or
/// attribute is logged at the call site and downgraded to `None` — the
/// resolver keeps going so a partially corrupt volume still yields partial
/// results.
#[derive(Debug, Error)]
pub enum NtfsError {
    #[error("invalid NTFS image: {0}")]
    InvalidImage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated read at offset {offset}, wanted {wanted} bytes, had {available}")]
    Truncated {
        offset: u64,
        wanted: usize,
        available: usize,
    },

    #[error("unknown attribute type 0x{0:x}")]
    UnknownAttrType(u32),

    #[error("MFT initialization failed: {0}")]
    MftInitFailed(String),

    #[error("malformed attribute: {0}")]
    InvalidAttribute(String),

    #[error("malformed data-run stream: {0}")]
    InvalidRunlist(String),
}

pub type Result<T> = std::result::Result<T, NtfsError>;
