//! Reserved metadata keys, media types and prefixes shared by both protocols.

/// MIME media type for gRPC.
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";
/// MIME media type for JSON.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// MIME media type for Protobuf.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";
/// MIME media type for arbitrary binary data.
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";

pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const CONTENT_LENGTH_HEADER: &str = "content-length";

/// Prefix applied to metadata that would otherwise collide with
/// transport-reserved header names.
pub const DAPR_HEADER_PREFIX: &str = "dapr-";

/// Suffix marking a gRPC metadata key whose values are binary.
pub const GRPC_BINARY_METADATA_SUFFIX: &str = "-bin";

/// Header carrying the id of the invoked app.
pub const DESTINATION_ID_HEADER: &str = "destination-app-id";
pub const CALLER_NAMESPACE_HEADER: &str = "dapr-caller-namespace";
pub const CALLER_ID_HEADER: &str = "dapr-caller-app-id";
pub const CALLEE_ID_HEADER: &str = "dapr-callee-app-id";

// W3C trace context
pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";
pub const BAGGAGE_HEADER: &str = "baggage";

/// gRPC metadata key holding the binary trace token.
pub const GRPC_TRACE_CONTEXT_KEY: &str = "grpc-trace-bin";
/// Present on streams proxied on behalf of a named app.
pub const GRPC_PROXY_APP_ID_KEY: &str = "dapr-app-id";
pub const GRPC_PROXY_CALLEE_ID_KEY: &str = CALLEE_ID_HEADER;

/// Highest accepted `traceparent` version.
pub const MAX_TRACE_VERSION: u8 = 254;
/// `tracestate` values longer than this are discarded.
pub const MAX_TRACESTATE_LEN: usize = 512;

/// Domain attached to `ErrorInfo` details built from HTTP responses.
pub const ERROR_INFO_DOMAIN: &str = "dapr.io";
pub const ERROR_INFO_HTTP_CODE_METADATA: &str = "http.code";
pub const ERROR_INFO_HTTP_ERROR_METADATA: &str = "http.error_message";
/// `ErrorInfo` metadata values are limited to 64 characters, the last
/// one being reserved.
pub const MAX_METADATA_VALUE_LEN: usize = 63;

/// Unary method the sidecar uses to probe app health.
pub const APP_HEALTH_CHECK_METHOD: &str = "/dapr.proto.runtime.v1.AppCallbackHealthCheck/HealthCheck";
