//! Serializer configuration.

/// Output capacity used by [`SerializerConfig::new`].
pub const DEFAULT_MAX_BYTES: usize = 20_000_000;

/// Configuration for a [`Serializer`](crate::Serializer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerConfig {
    /// Size of the output buffer, allocated once. A packet that would not fit
    /// fails with [`CodecError::CapacityExceeded`](crate::CodecError::CapacityExceeded).
    pub max_bytes: usize,
    /// Skip unchanged values of change-tracked properties. When off, tracked
    /// properties are sent in full but their shadows are still kept current.
    pub diff: bool,
}

impl SerializerConfig {
    /// Default configuration: 20 MB output buffer, diffing on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            diff: true,
        }
    }

    /// Override the output capacity.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Turn diffing of tracked properties on or off.
    #[must_use]
    pub fn with_diff(mut self, diff: bool) -> Self {
        self.diff = diff;
        self
    }
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self::new()
    }
}
