//! Format versioning for record payloads and on-disk slot containers.
//!
//! Every record buffer starts with a fixed-width ASCII tag naming its
//! layout. Adding a layout means adding a variant here and a matching
//! reader in the codec; old tags keep decoding.

/// Width in bytes of the leading version tag.
pub const RECORD_TAG_LEN: usize = 2;

/// Container version for the directory backend's slot files.
/// Increment when the envelope header changes.
pub const SLOT_CONTAINER_VERSION: u16 = 1;

/// Magic bytes for directory backend slot files.
pub const SLOT_CONTAINER_MAGIC: [u8; 4] = *b"CSAV";

/// Layouts the codec knows how to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordFormat {
    /// tag | f32 | u32-length-prefixed UTF-8 | i32, little-endian.
    V1,
}

impl RecordFormat {
    /// Layout written by `encode`.
    pub const CURRENT: RecordFormat = RecordFormat::V1;

    pub fn tag(self) -> &'static [u8; RECORD_TAG_LEN] {
        match self {
            RecordFormat::V1 => b"V1",
        }
    }

    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"V1" => Some(RecordFormat::V1),
            _ => None,
        }
    }
}
