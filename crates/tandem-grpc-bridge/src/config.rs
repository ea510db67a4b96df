//! Bridge configuration

use serde::Deserialize;

/// Options controlling how internal metadata is bridged
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Prefix IANA permanent header names with `dapr-` when producing gRPC
    /// metadata, so they cannot collide with HTTP/2 reserved headers
    pub http_header_conversion: bool,
}

impl BridgeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable permanent header prefixing
    pub fn http_header_conversion(mut self, enabled: bool) -> Self {
        self.http_header_conversion = enabled;
        self
    }
}
