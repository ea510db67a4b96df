//! gRPC call metrics for the Tandem sidecar
//!
//! Interception points time unary calls, proxied streams and app health
//! probes, and record byte counts, latencies and completion counts through
//! a pluggable [`StatsRecorder`].
//!
//! # Example
//!
//! ```rust,ignore
//! let metrics = GrpcMetrics::init(&DiagnosticsConfig::new("orders"), OtelStatsRecorder::new(meter))?;
//! let interceptor = MetricsInterceptor::new(metrics, Arc::new(TracingErrorCodeSink));
//! let reply = interceptor.unary_server(method, request, handler).await?;
//! ```

pub mod config;
pub mod grpc_metrics;
pub mod interceptor;
pub mod measures;
pub mod recorder;

pub use config::DiagnosticsConfig;
pub use grpc_metrics::{CallRecord, GrpcMetrics, RpcRole, StreamSide};
pub use interceptor::{ErrorCodeSink, MetricsInterceptor, PayloadSize, TracingErrorCodeSink};
pub use measures::{Aggregation, Measure, MeasureValue, TagKey, Unit, ValueKind, View};
pub use recorder::{MemoryStatsRecorder, OtelStatsRecorder, RecordedValue, StatsRecorder};
pub use tandem_core::{TandemError, TandemResult};
