//! HTTP and gRPC bridging for service invocation
//!
//! This crate translates request metadata, trace context and status codes
//! between HTTP callers and gRPC callers, so a request can cross protocols
//! without losing its headers or its trace.
//!
//! # Features
//!
//! - Internal metadata to gRPC metadata and HTTP headers
//! - W3C `traceparent` / `tracestate` and binary `grpc-trace-bin` propagation
//! - HTTP status to gRPC status mapping with `ErrorInfo` details
//! - Custom outgoing metadata attached to a call context

pub mod bridge;
pub mod config;
pub mod metadata;
pub mod propagation;
pub mod status;
pub mod trace_context;

pub use bridge::{
    internal_metadata_to_grpc_metadata, internal_metadata_to_header_map, internal_metadata_to_http_header,
    is_grpc_protocol, is_json_content_type, is_permanent_http_header, reserved_grpc_metadata_to_dapr_prefix_header,
    MetadataBridge,
};
pub use config::BridgeOptions;
pub use metadata::{canonical_header_key, outgoing_metadata, with_custom_grpc_metadata, GrpcMetadata, InternalMetadata};
pub use status::{code_from_http_status, error_from_http_response_code, error_from_internal_status, http_status_from_code};
pub use trace_context::{
    binary_from_span_context, span_context_from_binary, span_context_from_w3c, span_context_to_http_headers,
    span_context_to_w3c, trace_state_from_w3c, trace_state_to_w3c,
};
