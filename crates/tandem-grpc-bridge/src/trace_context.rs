//! Trace context wire formats.
//!
//! Two encodings of the same span context are supported:
//! - W3C `traceparent` / `tracestate` headers
//! - the legacy 29 byte binary token carried under `grpc-trace-bin`
//!
//! Binary layout: version byte `0`, then field `0` with the 16 byte trace id,
//! field `1` with the 8 byte span id and field `2` with the trace flags byte.

use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use tandem_core::keys::{MAX_TRACESTATE_LEN, MAX_TRACE_VERSION, TRACEPARENT_HEADER, TRACESTATE_HEADER};

const SUPPORTED_VERSION: u8 = 0;

const BINARY_VERSION: u8 = 0;
const TRACE_ID_FIELD: u8 = 0;
const SPAN_ID_FIELD: u8 = 1;
const TRACE_OPTIONS_FIELD: u8 = 2;
const BINARY_LEN: usize = 29;

/// Parse a W3C `traceparent` value (`version-traceid-spanid-flags`).
///
/// Returns `None` for empty or malformed input and for all-zero ids.
pub fn span_context_from_w3c(header: &str) -> Option<SpanContext> {
    if header.is_empty() {
        return None;
    }

    let sections: Vec<&str> = header.split('-').collect();
    if sections.len() < 4 {
        return None;
    }

    let version = parse_hex_byte(sections[0])?;
    if version > MAX_TRACE_VERSION {
        return None;
    }
    // Later versions may append fields; version 00 may not.
    if version == SUPPORTED_VERSION && sections.len() != 4 {
        return None;
    }

    if sections[1].len() != 32 || !is_lower_hex(sections[1]) {
        return None;
    }
    let trace_id = TraceId::from_hex(sections[1]).ok()?;

    if sections[2].len() != 16 || !is_lower_hex(sections[2]) {
        return None;
    }
    let span_id = SpanId::from_hex(sections[2]).ok()?;

    let flags = parse_hex_byte(sections[3])?;

    if trace_id == TraceId::INVALID || span_id == SpanId::INVALID {
        return None;
    }

    Some(SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::new(flags),
        true,
        TraceState::default(),
    ))
}

/// Parse a W3C `tracestate` value. Invalid or oversized input yields an
/// empty trace state.
pub fn trace_state_from_w3c(header: &str) -> TraceState {
    if header.is_empty() || header.len() > MAX_TRACESTATE_LEN {
        return TraceState::default();
    }
    header.parse().unwrap_or_default()
}

/// Copy of `sc` carrying `trace_state`
pub fn with_trace_state(sc: &SpanContext, trace_state: TraceState) -> SpanContext {
    SpanContext::new(sc.trace_id(), sc.span_id(), sc.trace_flags(), sc.is_remote(), trace_state)
}

/// Render the `traceparent` value for `sc`
pub fn span_context_to_w3c(sc: &SpanContext) -> String {
    format!(
        "{:02x}-{:032x}-{:016x}-{:02x}",
        SUPPORTED_VERSION,
        sc.trace_id(),
        sc.span_id(),
        sc.trace_flags().to_u8()
    )
}

/// Render the `tracestate` value for `sc`; empty when there is none
pub fn trace_state_to_w3c(sc: &SpanContext) -> String {
    sc.trace_state().header()
}

/// Emit `traceparent` and, when non-empty, `tracestate` for `sc`.
///
/// Nothing is emitted for an invalid span context.
pub fn span_context_to_http_headers(sc: &SpanContext, mut set_header: impl FnMut(&str, &str)) {
    if !sc.is_valid() {
        return;
    }

    set_header(TRACEPARENT_HEADER, &span_context_to_w3c(sc));

    let trace_state = trace_state_to_w3c(sc);
    if !trace_state.is_empty() {
        set_header(TRACESTATE_HEADER, &trace_state);
    }
}

/// Encode `sc` as a binary trace token. The empty span context encodes to
/// an empty token.
pub fn binary_from_span_context(sc: &SpanContext) -> Vec<u8> {
    if *sc == SpanContext::empty_context() {
        return Vec::new();
    }

    let mut buf = Vec::with_capacity(BINARY_LEN);
    buf.push(BINARY_VERSION);
    buf.push(TRACE_ID_FIELD);
    buf.extend_from_slice(&sc.trace_id().to_bytes());
    buf.push(SPAN_ID_FIELD);
    buf.extend_from_slice(&sc.span_id().to_bytes());
    buf.push(TRACE_OPTIONS_FIELD);
    buf.push(sc.trace_flags().to_u8());
    buf
}

/// Decode a binary trace token.
///
/// The version byte and trace id field are mandatory; the span id and trace
/// options fields are read when present.
pub fn span_context_from_binary(token: &[u8]) -> Option<SpanContext> {
    let (&version, rest) = token.split_first()?;
    if version != BINARY_VERSION {
        return None;
    }

    let (trace_id, rest) = match rest {
        [TRACE_ID_FIELD, tail @ ..] if tail.len() >= 16 => {
            let mut id = [0u8; 16];
            id.copy_from_slice(&tail[..16]);
            (TraceId::from_bytes(id), &tail[16..])
        }
        _ => return None,
    };

    let (span_id, rest) = match rest {
        [SPAN_ID_FIELD, tail @ ..] if tail.len() >= 8 => {
            let mut id = [0u8; 8];
            id.copy_from_slice(&tail[..8]);
            (SpanId::from_bytes(id), &tail[8..])
        }
        _ => (SpanId::INVALID, rest),
    };

    let mut flags = TraceFlags::default();
    if let [TRACE_OPTIONS_FIELD, options, ..] = rest {
        flags = TraceFlags::new(*options);
    }

    Some(SpanContext::new(trace_id, span_id, flags, true, TraceState::default()))
}

fn parse_hex_byte(s: &str) -> Option<u8> {
    if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(s, 16).ok()
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
