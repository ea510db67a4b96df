//! Trace context propagation across protocol boundaries.
//!
//! Each path is chosen by the protocol the metadata came from. Whenever the
//! inbound trace context is missing or unreadable, the span of the call
//! context is used instead, so every bridged call carries a trace.

use crate::metadata::{GrpcMetadata, GrpcMetadataInjector};
use crate::trace_context::{
    binary_from_span_context, span_context_from_binary, span_context_from_w3c,
    span_context_to_http_headers, trace_state_from_w3c, with_trace_state,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use opentelemetry::propagation::Injector;
use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry::Context;
use tandem_core::keys::{GRPC_TRACE_CONTEXT_KEY, TRACEPARENT_HEADER, TRACESTATE_HEADER};
use tracing::debug;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Span context of the span active in `cx`
pub fn ambient_span_context(cx: &Context) -> SpanContext {
    cx.span().span_context().clone()
}

/// OpenTelemetry context of the current `tracing` span
pub fn current_call_context() -> Context {
    tracing::Span::current().context()
}

/// HTTP source, gRPC destination.
///
/// The parsed (or ambient) span is written both as W3C headers and as the
/// binary token: some gRPC clients only understand `traceparent`.
pub fn http_to_grpc(cx: &Context, md: &mut GrpcMetadata, traceparent: &str, tracestate: &str) {
    let sc = match span_context_from_w3c(traceparent) {
        Some(sc) => with_trace_state(&sc, trace_state_from_w3c(tracestate)),
        None => {
            if !traceparent.is_empty() {
                debug!(traceparent, "malformed traceparent, using ambient span");
            }
            ambient_span_context(cx)
        }
    };
    set_grpc_trace(md, &sc);
}

/// gRPC source, gRPC destination.
///
/// A token that is not valid base64 is dropped. A decodable token is
/// forwarded as-is even when its contents cannot be parsed.
pub fn grpc_to_grpc(cx: &Context, md: &mut GrpcMetadata, grpc_trace_bin: &str) {
    if grpc_trace_bin.is_empty() {
        set_grpc_trace(md, &ambient_span_context(cx));
        return;
    }

    match STANDARD.decode(grpc_trace_bin) {
        Ok(decoded) => {
            if let Some(sc) = span_context_from_binary(&decoded) {
                mirror_w3c_headers(md, &sc);
            }
            md.set(GRPC_TRACE_CONTEXT_KEY, decoded);
        }
        Err(e) => debug!(error = %e, "dropping undecodable grpc-trace-bin value"),
    }
}

/// gRPC source, HTTP destination.
pub fn grpc_to_http(cx: &Context, grpc_trace_bin: &str, set_header: impl FnMut(&str, &str)) {
    let sc = STANDARD
        .decode(grpc_trace_bin)
        .ok()
        .and_then(|decoded| span_context_from_binary(&decoded))
        .filter(SpanContext::is_valid)
        .unwrap_or_else(|| ambient_span_context(cx));
    span_context_to_http_headers(&sc, set_header);
}

/// HTTP source, HTTP destination. Inbound headers pass through untouched.
pub fn http_to_http(cx: &Context, traceparent: &str, tracestate: &str, mut set_header: impl FnMut(&str, &str)) {
    if traceparent.is_empty() {
        span_context_to_http_headers(&ambient_span_context(cx), set_header);
        return;
    }

    set_header(TRACEPARENT_HEADER, traceparent);
    if !tracestate.is_empty() {
        set_header(TRACESTATE_HEADER, tracestate);
    }
}

fn set_grpc_trace(md: &mut GrpcMetadata, sc: &SpanContext) {
    mirror_w3c_headers(md, sc);

    let token = binary_from_span_context(sc);
    if !token.is_empty() {
        md.set(GRPC_TRACE_CONTEXT_KEY, token);
    }
}

fn mirror_w3c_headers(md: &mut GrpcMetadata, sc: &SpanContext) {
    let mut injector = GrpcMetadataInjector(md);
    span_context_to_http_headers(sc, |key, value| injector.set(key, value.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace_context::span_context_to_w3c;
    use opentelemetry::trace::{SpanId, TraceFlags, TraceId, TraceState};

    const INBOUND: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    fn ambient() -> (Context, SpanContext) {
        let sc = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::from_key_value([("vendor", "ambient")]).unwrap(),
        );
        (Context::new().with_remote_span_context(sc.clone()), sc)
    }

    fn headers_of(f: impl FnOnce(&mut dyn FnMut(&str, &str))) -> Vec<(String, String)> {
        let mut out = Vec::new();
        f(&mut |k: &str, v: &str| out.push((k.to_string(), v.to_string())));
        out
    }

    #[test]
    fn test_http_to_grpc_uses_inbound_traceparent() {
        let (cx, _) = ambient();
        let mut md = GrpcMetadata::new();

        http_to_grpc(&cx, &mut md, INBOUND, "rojo=00f067aa0ba902b7");

        assert_eq!(md.get_str("traceparent"), Some(INBOUND));
        assert_eq!(md.get_str("tracestate"), Some("rojo=00f067aa0ba902b7"));
        let sc = span_context_from_binary(md.get("grpc-trace-bin").unwrap()).unwrap();
        assert_eq!(span_context_to_w3c(&sc), INBOUND);
    }

    #[test]
    fn test_http_to_grpc_without_traceparent_uses_ambient() {
        let (cx, ambient_sc) = ambient();
        let mut md = GrpcMetadata::new();

        http_to_grpc(&cx, &mut md, "", "");

        assert_eq!(md.get_str("traceparent"), Some(span_context_to_w3c(&ambient_sc).as_str()));
        assert_eq!(md.get_str("tracestate"), Some("vendor=ambient"));
        assert_eq!(&md.get("grpc-trace-bin").unwrap()[..], binary_from_span_context(&ambient_sc));
    }

    #[test]
    fn test_http_to_grpc_malformed_falls_back() {
        let (cx, ambient_sc) = ambient();
        let mut md = GrpcMetadata::new();

        http_to_grpc(&cx, &mut md, "not-a-traceparent", "");

        assert_eq!(md.get_str("traceparent"), Some(span_context_to_w3c(&ambient_sc).as_str()));
    }

    #[test]
    fn test_grpc_to_grpc_forwards_token() {
        let (cx, _) = ambient();
        let inbound = span_context_from_w3c(INBOUND).unwrap();
        let token = STANDARD.encode(binary_from_span_context(&inbound));
        let mut md = GrpcMetadata::new();

        grpc_to_grpc(&cx, &mut md, &token);

        assert_eq!(md.get_str("traceparent"), Some(INBOUND));
        assert_eq!(&md.get("grpc-trace-bin").unwrap()[..], binary_from_span_context(&inbound));
    }

    #[test]
    fn test_grpc_to_grpc_unparsable_token_forwarded_raw() {
        let (cx, _) = ambient();
        let mut md = GrpcMetadata::new();

        grpc_to_grpc(&cx, &mut md, &STANDARD.encode([9u8, 9, 9]));

        assert!(md.get("traceparent").is_none());
        assert_eq!(&md.get("grpc-trace-bin").unwrap()[..], &[9u8, 9, 9]);
    }

    #[test]
    fn test_grpc_to_grpc_invalid_base64_dropped() {
        let (cx, _) = ambient();
        let mut md = GrpcMetadata::new();

        grpc_to_grpc(&cx, &mut md, "%%%");

        assert!(md.is_empty());
    }

    #[test]
    fn test_grpc_to_grpc_empty_token_uses_ambient() {
        let (cx, ambient_sc) = ambient();
        let mut md = GrpcMetadata::new();

        grpc_to_grpc(&cx, &mut md, "");

        assert_eq!(md.get_str("traceparent"), Some(span_context_to_w3c(&ambient_sc).as_str()));
        assert!(md.contains_key("grpc-trace-bin"));
    }

    #[test]
    fn test_grpc_to_http() {
        let (cx, ambient_sc) = ambient();
        let inbound = span_context_from_w3c(INBOUND).unwrap();
        let token = STANDARD.encode(binary_from_span_context(&inbound));

        let headers = headers_of(|set| grpc_to_http(&cx, &token, set));
        assert_eq!(headers, vec![("traceparent".to_string(), INBOUND.to_string())]);

        let headers = headers_of(|set| grpc_to_http(&cx, "%%%", set));
        assert_eq!(headers[0].1, span_context_to_w3c(&ambient_sc));
        assert_eq!(headers[1], ("tracestate".to_string(), "vendor=ambient".to_string()));
    }

    #[test]
    fn test_grpc_to_http_invalid_token_uses_ambient() {
        let (cx, ambient_sc) = ambient();
        let expected = span_context_to_w3c(&ambient_sc);

        // trace id field only, no span id
        let mut trace_only = vec![0u8, 0];
        trace_only.extend_from_slice(&[0x07; 16]);
        let headers = headers_of(|set| grpc_to_http(&cx, &STANDARD.encode(&trace_only), set));
        assert_eq!(headers[0], ("traceparent".to_string(), expected.clone()));

        let zeroed = binary_from_span_context(&SpanContext::new(
            TraceId::INVALID,
            SpanId::INVALID,
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ));
        assert_eq!(zeroed.len(), 29);
        let headers = headers_of(|set| grpc_to_http(&cx, &STANDARD.encode(&zeroed), set));
        assert_eq!(headers[0], ("traceparent".to_string(), expected));
    }

    #[test]
    fn test_http_to_http_passthrough() {
        let (cx, _) = ambient();

        let headers = headers_of(|set| http_to_http(&cx, "opaque-parent", "k=v", set));
        assert_eq!(
            headers,
            vec![
                ("traceparent".to_string(), "opaque-parent".to_string()),
                ("tracestate".to_string(), "k=v".to_string()),
            ]
        );

        let headers = headers_of(|set| http_to_http(&cx, "opaque-parent", "", set));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_http_to_http_without_traceparent_uses_ambient() {
        let (cx, ambient_sc) = ambient();
        let headers = headers_of(|set| http_to_http(&cx, "", "ignored=1", set));
        assert_eq!(headers[0].1, span_context_to_w3c(&ambient_sc));
        assert_eq!(headers[1].1, "vendor=ambient");
    }
}
