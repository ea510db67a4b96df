//! Interception points that time calls and feed [`GrpcMetrics`].
//!
//! Each wrapper takes the handler (or invoker) as a closure or future,
//! awaits it, records the outcome and returns it unchanged. Failed calls
//! are also reported to the [`ErrorCodeSink`].

use crate::grpc_metrics::GrpcMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tandem_core::keys::{APP_HEALTH_CHECK_METHOD, GRPC_PROXY_APP_ID_KEY};
use tandem_core::Status;
use tandem_grpc_bridge::GrpcMetadata;
use tracing::debug;

/// Encoded size of a message, in bytes
pub trait PayloadSize {
    fn payload_size(&self) -> usize;
}

impl<M: prost::Message> PayloadSize for M {
    fn payload_size(&self) -> usize {
        self.encoded_len()
    }
}

/// Receives the status of every failed intercepted call
pub trait ErrorCodeSink: Send + Sync {
    fn record_error_code(&self, status: &Status);
}

/// Sink that emits a debug event per failed call
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorCodeSink;

impl ErrorCodeSink for TracingErrorCodeSink {
    fn record_error_code(&self, status: &Status) {
        debug!(code = %status.code, message = %status.message, "call failed");
    }
}

fn payload_len(payload: &impl PayloadSize) -> i64 {
    i64::try_from(payload.payload_size()).unwrap_or(i64::MAX)
}

/// Records call metrics around handlers and invokers
#[derive(Clone)]
pub struct MetricsInterceptor {
    metrics: GrpcMetrics,
    errors: Arc<dyn ErrorCodeSink>,
}

impl MetricsInterceptor {
    pub fn new(metrics: GrpcMetrics, errors: Arc<dyn ErrorCodeSink>) -> Self {
        Self { metrics, errors }
    }

    pub fn metrics(&self) -> &GrpcMetrics {
        &self.metrics
    }

    fn surface_error<T>(&self, result: &Result<T, Status>) {
        if let Err(status) = result {
            self.errors.record_error_code(status);
        }
    }

    /// Serve a unary call. The response size is 0 when the handler fails.
    pub async fn unary_server<Req, Resp, F, Fut>(&self, method: &str, req: Req, handler: F) -> Result<Resp, Status>
    where
        Req: PayloadSize,
        Resp: PayloadSize,
        F: FnOnce(Req) -> Fut,
        Fut: Future<Output = Result<Resp, Status>>,
    {
        let start = Instant::now();
        let request_bytes = payload_len(&req);

        let result = handler(req).await;

        let response_bytes = result.as_ref().map(payload_len).unwrap_or(0);
        self.metrics
            .server_request_sent(method, Status::code_of(&result), request_bytes, response_bytes, start);
        self.surface_error(&result);
        result
    }

    /// Make a unary call. Calls to the app health check are recorded as
    /// health probes.
    pub async fn unary_client<Req, Resp, F, Fut>(&self, method: &str, req: Req, invoker: F) -> Result<Resp, Status>
    where
        Req: PayloadSize,
        Resp: PayloadSize,
        F: FnOnce(Req) -> Fut,
        Fut: Future<Output = Result<Resp, Status>>,
    {
        let start = Instant::now();
        let request_bytes = payload_len(&req);

        let result = invoker(req).await;

        let code = Status::code_of(&result);
        if method == APP_HEALTH_CHECK_METHOD {
            self.metrics.app_health_probe_completed(code, start);
        } else {
            let response_bytes = result.as_ref().map(payload_len).unwrap_or(0);
            self.metrics
                .client_request_received(method, code, request_bytes, response_bytes, start);
        }
        self.surface_error(&result);
        result
    }

    /// Serve a proxied stream arriving from the application.
    ///
    /// Streams without a `dapr-app-id` in `inbound` are not proxied and run
    /// unrecorded.
    pub async fn streaming_server<T, Fut>(&self, method: &str, inbound: &GrpcMetadata, handler: Fut) -> Result<T, Status>
    where
        Fut: Future<Output = Result<T, Status>>,
    {
        if !is_proxied(inbound) {
            return handler.await;
        }

        let start = Instant::now();
        let result = handler.await;
        self.metrics.stream_server_request_sent(method, Status::code_of(&result), start);
        self.surface_error(&result);
        result
    }

    /// Serve a proxied stream arriving from a remote sidecar. Gated like
    /// [`MetricsInterceptor::streaming_server`].
    pub async fn streaming_client<T, Fut>(&self, method: &str, inbound: &GrpcMetadata, handler: Fut) -> Result<T, Status>
    where
        Fut: Future<Output = Result<T, Status>>,
    {
        if !is_proxied(inbound) {
            return handler.await;
        }

        let start = Instant::now();
        let result = handler.await;
        self.metrics.stream_client_request_sent(method, Status::code_of(&result), start);
        self.surface_error(&result);
        result
    }
}

fn is_proxied(inbound: &GrpcMetadata) -> bool {
    !inbound.get_all(GRPC_PROXY_APP_ID_KEY).is_empty()
}
