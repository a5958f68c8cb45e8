//! Codec error types.

use delta_store::StoreError;

/// Errors that abort a single serialize or deserialize call.
///
/// State written before the failure (storage values on the receive side) is
/// left as-is; callers that need consistency re-send the whole packet.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A write would run past the serializer's fixed output capacity.
    #[error("packet exceeds output capacity: needed {needed} bytes, capacity is {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    /// A packet named a property id the local table does not have.
    #[error("unknown property id {0}")]
    UnknownPropertyId(u8),

    /// A declared count implies more bytes than the packet holds.
    #[error("truncated packet at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    TruncatedPacket {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    /// An array element index past the local array length.
    #[error("element index {index} out of range for property {property} (length {len})")]
    ElementOutOfRange { property: u8, index: u32, len: u32 },

    /// The resolved property table does not fit the one-byte property id.
    #[error("property table has {0} entries, at most 256 are addressable")]
    TooManyProperties(usize),

    /// The locally resolved schema differs from the one agreed out of band.
    #[error("schema mismatch: expected fingerprint {expected:#018x}, resolved {found:#018x}")]
    SchemaMismatch { expected: u64, found: u64 },

    /// Failed to encode a schema descriptor.
    #[error("failed to encode schema: {0}")]
    SchemaEncode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a schema descriptor.
    #[error("failed to decode schema: {0}")]
    SchemaDecode(#[from] rmp_serde::decode::Error),

    /// A storage operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
