//! Internal metadata to gRPC metadata and HTTP headers.
//!
//! Keys are classified by an ordered table of rules per direction; the first
//! matching rule decides what happens to the key. Trace keys are held back
//! and handed to the propagation path matching the source protocol.

use crate::config::BridgeOptions;
use crate::metadata::{GrpcMetadata, InternalMetadata};
use crate::propagation;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::Context;
use std::borrow::Cow;
use tandem_core::keys::{
    BAGGAGE_HEADER, CONTENT_TYPE_HEADER, DAPR_HEADER_PREFIX, DESTINATION_ID_HEADER,
    GRPC_BINARY_METADATA_SUFFIX, GRPC_CONTENT_TYPE, GRPC_TRACE_CONTEXT_KEY, JSON_CONTENT_TYPE,
    TRACEPARENT_HEADER, TRACESTATE_HEADER,
};
use tracing::debug;

/// Trace keys held back from plain copying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKey {
    Traceparent,
    Tracestate,
    GrpcTraceBin,
}

/// What to do with a metadata key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Keep the first value for trace propagation
    Capture(TraceKey),
    /// Do not forward
    Drop,
    /// Forward the first value under `baggage`
    Baggage,
    /// Forward every value under `dapr-<key>`
    Prefix,
    /// Forward every value base64-decoded
    DecodeBinary,
    /// Forward every value under the reserved-name rewrite of the key
    Rename,
    /// Forward every value unchanged
    Copy,
}

/// A key as seen by the rules
#[derive(Debug, Clone, Copy)]
pub struct KeyView<'a> {
    /// Key as received
    pub raw: &'a str,
    /// Lower-cased key
    pub lower: &'a str,
    pub http_header_conversion: bool,
}

/// A predicate and the action taken when it matches
#[derive(Debug, Clone, Copy)]
pub struct KeyRule {
    pub name: &'static str,
    pub matches: fn(&KeyView<'_>) -> bool,
    pub action: KeyAction,
}

/// Rules for producing gRPC metadata
pub static GRPC_METADATA_RULES: &[KeyRule] = &[
    KeyRule { name: "traceparent", matches: is_traceparent, action: KeyAction::Capture(TraceKey::Traceparent) },
    KeyRule { name: "tracestate", matches: is_tracestate, action: KeyAction::Capture(TraceKey::Tracestate) },
    KeyRule { name: "grpc-trace-bin", matches: is_grpc_trace_bin, action: KeyAction::Capture(TraceKey::GrpcTraceBin) },
    KeyRule { name: "destination-app-id", matches: is_destination_id, action: KeyAction::Drop },
    KeyRule { name: "permanent-header", matches: is_converted_permanent_header, action: KeyAction::Prefix },
    KeyRule { name: "binary", matches: raw_has_binary_suffix, action: KeyAction::DecodeBinary },
    KeyRule { name: "default", matches: any_key, action: KeyAction::Copy },
];

/// Rules for producing HTTP headers
pub static HTTP_HEADER_RULES: &[KeyRule] = &[
    KeyRule { name: "traceparent", matches: is_traceparent, action: KeyAction::Capture(TraceKey::Traceparent) },
    KeyRule { name: "tracestate", matches: is_tracestate, action: KeyAction::Capture(TraceKey::Tracestate) },
    KeyRule { name: "grpc-trace-bin", matches: is_grpc_trace_bin, action: KeyAction::Capture(TraceKey::GrpcTraceBin) },
    KeyRule { name: "destination-app-id", matches: is_destination_id, action: KeyAction::Drop },
    KeyRule { name: "baggage", matches: is_baggage, action: KeyAction::Baggage },
    KeyRule { name: "binary", matches: lower_has_binary_suffix, action: KeyAction::Drop },
    KeyRule { name: "content-type", matches: is_content_type, action: KeyAction::Drop },
    KeyRule { name: "default", matches: any_key, action: KeyAction::Rename },
];

/// Action of the first rule matching `key`; `Copy` when none does
pub fn classify(rules: &[KeyRule], key: &KeyView<'_>) -> KeyAction {
    rules
        .iter()
        .find(|rule| (rule.matches)(key))
        .map(|rule| rule.action)
        .unwrap_or(KeyAction::Copy)
}

fn is_traceparent(key: &KeyView<'_>) -> bool {
    key.lower == TRACEPARENT_HEADER
}

fn is_tracestate(key: &KeyView<'_>) -> bool {
    key.lower == TRACESTATE_HEADER
}

fn is_grpc_trace_bin(key: &KeyView<'_>) -> bool {
    key.lower == GRPC_TRACE_CONTEXT_KEY
}

fn is_destination_id(key: &KeyView<'_>) -> bool {
    key.lower == DESTINATION_ID_HEADER
}

fn is_baggage(key: &KeyView<'_>) -> bool {
    key.lower == BAGGAGE_HEADER
}

fn is_content_type(key: &KeyView<'_>) -> bool {
    key.lower == CONTENT_TYPE_HEADER
}

fn is_converted_permanent_header(key: &KeyView<'_>) -> bool {
    key.http_header_conversion && is_permanent_http_header(key.raw)
}

fn raw_has_binary_suffix(key: &KeyView<'_>) -> bool {
    key.raw.ends_with(GRPC_BINARY_METADATA_SUFFIX)
}

fn lower_has_binary_suffix(key: &KeyView<'_>) -> bool {
    key.lower.ends_with(GRPC_BINARY_METADATA_SUFFIX)
}

fn any_key(_: &KeyView<'_>) -> bool {
    true
}

/// Whether `header` is one of the permanent request headers registered
/// with IANA. The match is exact against the canonical capitalization.
///
/// <http://www.iana.org/assignments/message-headers/message-headers.xml>
pub fn is_permanent_http_header(header: &str) -> bool {
    matches!(
        header,
        "Accept"
            | "Accept-Charset"
            | "Accept-Language"
            | "Accept-Ranges"
            // Connection-specific fields are prohibited in HTTP/2 (RFC 7540 8.1.2.2).
            | "Connection"
            | "Keep-Alive"
            | "Proxy-Connection"
            | "Transfer-Encoding"
            | "Upgrade"
            | "Cache-Control"
            | "Content-Type"
            // HTTP/1.1 payload size, not the sum of HTTP/2 DATA frames.
            | "Content-Length"
            | "Cookie"
            | "Date"
            | "Expect"
            | "From"
            | "Host"
            | "If-Match"
            | "If-Modified-Since"
            | "If-None-Match"
            | "If-Schedule-Tag-Match"
            | "If-Unmodified-Since"
            | "Max-Forwards"
            | "Origin"
            | "Pragma"
            | "Referer"
            | "Via"
            | "Warning"
    )
}

/// Whether the metadata came in over gRPC, judged by its first `content-type`
pub fn is_grpc_protocol(internal: &InternalMetadata) -> bool {
    internal
        .first(CONTENT_TYPE_HEADER)
        .map(|ct| ct.starts_with(GRPC_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Whether `content_type` is JSON, ignoring case
pub fn is_json_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().starts_with(JSON_CONTENT_TYPE)
}

/// Header name for a gRPC metadata key that HTTP peers must not see verbatim.
///
/// Pseudo-headers lose their colon and `grpc-` keys are namespaced, both
/// under `dapr-`. See <https://github.com/grpc/grpc/blob/master/doc/PROTOCOL-HTTP2.md>.
pub fn reserved_grpc_metadata_to_dapr_prefix_header(key: &str) -> Cow<'_, str> {
    match key {
        ":method" | ":scheme" | ":path" | ":authority" => Cow::Owned(format!("{DAPR_HEADER_PREFIX}{}", &key[1..])),
        _ if key.starts_with("grpc-") => Cow::Owned(format!("{DAPR_HEADER_PREFIX}{key}")),
        _ => Cow::Borrowed(key),
    }
}

#[derive(Debug, Default)]
struct TraceHeaders<'a> {
    traceparent: &'a str,
    tracestate: &'a str,
    grpc_trace_bin: &'a str,
}

impl<'a> TraceHeaders<'a> {
    fn capture(&mut self, key: TraceKey, values: &'a [String]) {
        let value = values.first().map(String::as_str).unwrap_or("");
        match key {
            TraceKey::Traceparent => self.traceparent = value,
            TraceKey::Tracestate => self.tracestate = value,
            TraceKey::GrpcTraceBin => self.grpc_trace_bin = value,
        }
    }
}

/// Convert internal metadata into metadata for an outgoing gRPC call.
///
/// Trace context is rebuilt from the inbound trace keys (or the span of
/// `cx`) and written both as `grpc-trace-bin` and as W3C headers.
pub fn internal_metadata_to_grpc_metadata(
    cx: &Context,
    internal: &InternalMetadata,
    http_header_conversion: bool,
) -> GrpcMetadata {
    let mut md = GrpcMetadata::new();
    let mut trace = TraceHeaders::default();

    for (key, values) in internal.iter() {
        let lower = key.to_ascii_lowercase();
        let view = KeyView {
            raw: key,
            lower: &lower,
            http_header_conversion,
        };

        match classify(GRPC_METADATA_RULES, &view) {
            KeyAction::Capture(trace_key) => trace.capture(trace_key, values),
            KeyAction::Drop => {}
            KeyAction::Prefix => {
                let name = format!("{DAPR_HEADER_PREFIX}{lower}");
                for value in values {
                    md.append(&name, value.clone());
                }
            }
            KeyAction::DecodeBinary => {
                for value in values {
                    match STANDARD.decode(value) {
                        Ok(decoded) => md.append(&lower, decoded),
                        Err(e) => debug!(key, error = %e, "dropping undecodable binary metadata value"),
                    }
                }
            }
            KeyAction::Baggage | KeyAction::Rename | KeyAction::Copy => {
                for value in values {
                    md.append(&lower, value.clone());
                }
            }
        }
    }

    if is_grpc_protocol(internal) {
        propagation::grpc_to_grpc(cx, &mut md, trace.grpc_trace_bin);
    } else {
        propagation::http_to_grpc(cx, &mut md, trace.traceparent, trace.tracestate);
    }
    md
}

/// Convert internal metadata into HTTP headers, one `set_header` call per value.
///
/// Trace context is emitted as `traceparent` / `tracestate`.
pub fn internal_metadata_to_http_header(
    cx: &Context,
    internal: &InternalMetadata,
    mut set_header: impl FnMut(&str, &str),
) {
    let mut trace = TraceHeaders::default();

    for (key, values) in internal.iter() {
        if values.is_empty() {
            continue;
        }

        let lower = key.to_ascii_lowercase();
        let view = KeyView {
            raw: key,
            lower: &lower,
            http_header_conversion: false,
        };

        match classify(HTTP_HEADER_RULES, &view) {
            KeyAction::Capture(trace_key) => trace.capture(trace_key, values),
            KeyAction::Drop => {}
            KeyAction::Baggage => set_header(BAGGAGE_HEADER, &values[0]),
            KeyAction::Prefix | KeyAction::DecodeBinary | KeyAction::Rename | KeyAction::Copy => {
                let name = reserved_grpc_metadata_to_dapr_prefix_header(&lower);
                for value in values {
                    set_header(&name, value);
                }
            }
        }
    }

    if is_grpc_protocol(internal) {
        propagation::grpc_to_http(cx, trace.grpc_trace_bin, set_header);
    } else {
        propagation::http_to_http(cx, trace.traceparent, trace.tracestate, set_header);
    }
}

/// [`internal_metadata_to_http_header`] collected into a `HeaderMap`.
///
/// Names or values `http` rejects are skipped.
pub fn internal_metadata_to_header_map(cx: &Context, internal: &InternalMetadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    internal_metadata_to_http_header(cx, internal, |key, value| {
        match (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!(key, "skipping header not representable in HTTP"),
        }
    });
    headers
}

/// Bridges internal metadata with fixed [`BridgeOptions`]
#[derive(Debug, Clone, Default)]
pub struct MetadataBridge {
    options: BridgeOptions,
}

impl MetadataBridge {
    pub fn new(options: BridgeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Metadata for an outgoing gRPC call
    pub fn to_grpc_metadata(&self, cx: &Context, internal: &InternalMetadata) -> GrpcMetadata {
        internal_metadata_to_grpc_metadata(cx, internal, self.options.http_header_conversion)
    }

    /// Headers for an outgoing HTTP request
    pub fn to_header_map(&self, cx: &Context, internal: &InternalMetadata) -> HeaderMap {
        internal_metadata_to_header_map(cx, internal)
    }
}
