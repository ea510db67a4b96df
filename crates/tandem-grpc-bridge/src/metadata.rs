//! Protocol-neutral and gRPC metadata containers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::Context;
use std::collections::HashMap;
use tandem_core::keys::{
    CONTENT_LENGTH_HEADER, CONTENT_TYPE_HEADER, GRPC_BINARY_METADATA_SUFFIX,
};
use tracing::debug;

/// Headers and metadata transferred between an app and its sidecar.
///
/// Keys keep the spelling they arrived with, except HTTP header names,
/// which are stored in canonical form (`Content-Type`). A stored key always
/// has at least one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternalMetadata {
    entries: HashMap<String, Vec<String>>,
}

impl InternalMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the values stored under `key`. An empty list is ignored.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<String>) {
        if values.is_empty() {
            return;
        }
        self.entries.insert(key.into(), values);
    }

    /// Append a single value under `key`
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(key.into()).or_default().push(value.into());
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// First value stored under `key`
    pub fn first(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collect inbound HTTP headers under their canonical names. Values that
    /// are not visible ASCII are skipped.
    pub fn from_http_headers(headers: &HeaderMap) -> Self {
        let mut md = Self::new();
        for (name, value) in headers {
            match value.to_str() {
                Ok(v) => md.append(canonical_header_key(name.as_str()), v),
                Err(_) => debug!(header = %name, "skipping non-ASCII header value"),
            }
        }
        md
    }

    /// Collect inbound gRPC metadata. Binary values are base64-encoded so
    /// they survive as strings.
    pub fn from_grpc_metadata(grpc: &GrpcMetadata) -> Self {
        let mut md = Self::new();
        for (key, values) in grpc.iter() {
            let binary = key.ends_with(GRPC_BINARY_METADATA_SUFFIX);
            for value in values {
                if binary {
                    md.append(key, STANDARD.encode(value));
                } else {
                    match std::str::from_utf8(value) {
                        Ok(v) => md.append(key, v),
                        Err(_) => debug!(key, "skipping non UTF-8 metadata value"),
                    }
                }
            }
        }
        md
    }
}

/// Canonical MIME form of a header name: the first letter and every letter
/// after a hyphen upper-cased, the rest lower-cased.
///
/// Names containing a space or a non-token byte are returned unchanged.
pub fn canonical_header_key(name: &str) -> String {
    if !name.bytes().all(is_token_byte) {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() };
            upper = c == '-';
            out
        })
        .collect()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

impl<K, V> FromIterator<(K, V)> for InternalMetadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut md = Self::new();
        for (k, v) in iter {
            md.append(k, v);
        }
        md
    }
}

/// gRPC metadata: lower-cased keys mapping to ordered raw values.
///
/// Values under `-bin` keys hold decoded bytes; base64 is only applied when
/// rendering to the wire with [`GrpcMetadata::to_header_map`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrpcMetadata {
    entries: HashMap<String, Vec<Bytes>>,
}

impl GrpcMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, lower-casing the key
    pub fn append(&mut self, key: &str, value: impl Into<Bytes>) {
        self.entries
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Replace all values under `key` with `value`
    pub fn set(&mut self, key: &str, value: impl Into<Bytes>) {
        self.entries.insert(key.to_ascii_lowercase(), vec![value.into()]);
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries.get(key).and_then(|v| v.first())
    }

    /// First value under `key` as UTF-8
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn get_all(&self, key: &str) -> &[Bytes] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Bytes])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as HTTP/2 headers for a gRPC transport.
    ///
    /// Binary values are base64-encoded. Entries `http` rejects are skipped.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(self.entries.len());
        for (key, values) in &self.entries {
            let name = match HeaderName::from_bytes(key.as_bytes()) {
                Ok(name) => name,
                Err(e) => {
                    debug!(key = %key, error = %e, "skipping invalid metadata key");
                    continue;
                }
            };
            let binary = key.ends_with(GRPC_BINARY_METADATA_SUFFIX);
            for value in values {
                let header_value = if binary {
                    HeaderValue::from_str(&STANDARD.encode(value))
                } else {
                    HeaderValue::from_bytes(value)
                };
                match header_value {
                    Ok(v) => {
                        headers.append(name.clone(), v);
                    }
                    Err(e) => debug!(key = %key, error = %e, "skipping invalid metadata value"),
                }
            }
        }
        headers
    }
}

/// Metadata to attach to the next outgoing gRPC call, carried in the call
/// [`Context`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMetadata(pub GrpcMetadata);

/// Outgoing metadata attached to `cx`, if any
pub fn outgoing_metadata(cx: &Context) -> Option<&GrpcMetadata> {
    cx.get::<OutgoingMetadata>().map(|md| &md.0)
}

/// Apply a plain key/value map to the outgoing metadata of `cx`.
///
/// `content-type` and `content-length` are skipped in any casing: the
/// payload framing already represents them. Keys are lower-cased, values
/// are copied unchanged.
pub fn with_custom_grpc_metadata(cx: &Context, md: &HashMap<String, String>) -> Context {
    let mut outgoing = outgoing_metadata(cx).cloned().unwrap_or_default();
    let mut appended = false;

    for (key, value) in md {
        if key.eq_ignore_ascii_case(CONTENT_TYPE_HEADER) || key.eq_ignore_ascii_case(CONTENT_LENGTH_HEADER) {
            continue;
        }
        outgoing.append(key, value.clone());
        appended = true;
    }

    if !appended {
        return cx.clone();
    }
    cx.with_value(OutgoingMetadata(outgoing))
}

/// Reads first values out of [`InternalMetadata`] for a text-map propagator.
pub struct MetadataExtractor<'a>(pub &'a InternalMetadata);

impl Extractor for MetadataExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.first(key)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.entries.keys().map(String::as_str).collect()
    }
}

/// Writes propagator output into [`GrpcMetadata`], replacing existing values.
pub struct GrpcMetadataInjector<'a>(pub &'a mut GrpcMetadata);

impl Injector for GrpcMetadataInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.set(key, value);
    }
}
