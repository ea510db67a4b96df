//! gRPC call metrics.
//!
//! `GrpcMetrics` is created once at startup and cloned into every
//! interception point. A disabled instance records nothing.

use crate::config::DiagnosticsConfig;
use crate::measures::{
    grpc_views, MeasureValue, TagKey, CLIENT_COMPLETED_RPCS, CLIENT_RECEIVED_BYTES,
    CLIENT_ROUNDTRIP_LATENCY, CLIENT_SENT_BYTES, HEALTH_PROBE_COMPLETED_COUNT, HEALTH_PROBE_ROUNDTRIP_LATENCY,
    SERVER_COMPLETED_RPCS, SERVER_LATENCY, SERVER_RECEIVED_BYTES, SERVER_SENT_BYTES,
};
use crate::recorder::StatsRecorder;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tandem_core::{Code, TandemResult};
use tracing::info;

/// Side of a proxied stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSide {
    /// Call arriving from the application
    Server,
    /// Call arriving from a remote sidecar
    Client,
}

/// Which measurements a completed call feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcRole {
    /// Unary call served: bytes, latency and count
    Server,
    /// Unary call made: bytes, latency and count
    Client,
    /// App health check: latency and count tagged by status only
    HealthProbe,
    /// Proxied stream: latency and count
    Streaming(StreamSide),
}

/// One completed call
#[derive(Debug, Clone)]
pub struct CallRecord<'a> {
    pub method: &'a str,
    pub role: RpcRole,
    pub start: Instant,
    pub request_bytes: i64,
    pub response_bytes: i64,
    pub status: Code,
}

impl<'a> CallRecord<'a> {
    pub fn new(method: &'a str, role: RpcRole, start: Instant, status: Code) -> Self {
        Self {
            method,
            role,
            start,
            request_bytes: 0,
            response_bytes: 0,
            status,
        }
    }

    pub fn with_sizes(mut self, request_bytes: i64, response_bytes: i64) -> Self {
        self.request_bytes = request_bytes;
        self.response_bytes = response_bytes;
        self
    }
}

struct Enabled {
    app_id: String,
    recorder: Arc<dyn StatsRecorder>,
}

/// gRPC metrics registry
#[derive(Clone)]
pub struct GrpcMetrics {
    enabled: Option<Arc<Enabled>>,
}

impl fmt::Debug for GrpcMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrpcMetrics")
            .field("enabled", &self.is_enabled())
            .field("app_id", &self.app_id())
            .finish()
    }
}

impl GrpcMetrics {
    /// Metrics that record nothing
    pub fn disabled() -> Self {
        Self { enabled: None }
    }

    /// Register the gRPC views with `recorder` and start recording.
    ///
    /// Returns a disabled instance when `config.enabled` is false; the
    /// recorder is then left untouched.
    pub fn init<R: StatsRecorder>(config: &DiagnosticsConfig, mut recorder: R) -> TandemResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        config.validate()?;
        recorder.register(&grpc_views(config.latency_distribution()))?;
        info!(app_id = %config.app_id, "gRPC metrics enabled");

        Ok(Self {
            enabled: Some(Arc::new(Enabled {
                app_id: config.app_id.clone(),
                recorder: Arc::new(recorder),
            })),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.is_some()
    }

    pub fn app_id(&self) -> Option<&str> {
        self.enabled.as_deref().map(|e| e.app_id.as_str())
    }

    /// Record the measurements `call.role` calls for
    pub fn record(&self, call: &CallRecord<'_>) {
        let Some(enabled) = self.enabled.as_deref() else {
            return;
        };

        let app_id = enabled.app_id.as_str();
        let status = call.status.as_str();
        let elapsed = MeasureValue::Float(call.start.elapsed().as_millis() as f64);
        let recorder = enabled.recorder.as_ref();

        match call.role {
            RpcRole::Server | RpcRole::Streaming(StreamSide::Server) => {
                let by_status = [
                    (TagKey::APP_ID, app_id),
                    (TagKey::SERVER_METHOD, call.method),
                    (TagKey::SERVER_STATUS, status),
                ];
                recorder.record(&SERVER_COMPLETED_RPCS, MeasureValue::Int(1), &by_status[..]);
                if call.role == RpcRole::Server {
                    let by_method = &by_status[..2];
                    recorder.record(&SERVER_RECEIVED_BYTES, MeasureValue::Int(call.request_bytes), by_method);
                    recorder.record(&SERVER_SENT_BYTES, MeasureValue::Int(call.response_bytes), by_method);
                }
                recorder.record(&SERVER_LATENCY, elapsed, &by_status[..]);
            }
            RpcRole::Client | RpcRole::Streaming(StreamSide::Client) => {
                let by_status = [
                    (TagKey::APP_ID, app_id),
                    (TagKey::CLIENT_METHOD, call.method),
                    (TagKey::CLIENT_STATUS, status),
                ];
                recorder.record(&CLIENT_COMPLETED_RPCS, MeasureValue::Int(1), &by_status[..]);
                recorder.record(&CLIENT_ROUNDTRIP_LATENCY, elapsed, &by_status[..]);
                if call.role == RpcRole::Client {
                    let by_method = &by_status[..2];
                    recorder.record(&CLIENT_SENT_BYTES, MeasureValue::Int(call.request_bytes), by_method);
                    recorder.record(&CLIENT_RECEIVED_BYTES, MeasureValue::Int(call.response_bytes), by_method);
                }
            }
            RpcRole::HealthProbe => {
                let tags = [(TagKey::APP_ID, app_id), (TagKey::CLIENT_STATUS, status)];
                recorder.record(&HEALTH_PROBE_COMPLETED_COUNT, MeasureValue::Int(1), &tags[..]);
                recorder.record(&HEALTH_PROBE_ROUNDTRIP_LATENCY, elapsed, &tags[..]);
            }
        }
    }

    /// A unary call served by this process completed
    pub fn server_request_sent(&self, method: &str, status: Code, request_bytes: i64, response_bytes: i64, start: Instant) {
        self.record(&CallRecord::new(method, RpcRole::Server, start, status).with_sizes(request_bytes, response_bytes));
    }

    /// A unary call made by this process completed
    pub fn client_request_received(
        &self,
        method: &str,
        status: Code,
        request_bytes: i64,
        response_bytes: i64,
        start: Instant,
    ) {
        self.record(&CallRecord::new(method, RpcRole::Client, start, status).with_sizes(request_bytes, response_bytes));
    }

    /// A proxied stream from the application completed
    pub fn stream_server_request_sent(&self, method: &str, status: Code, start: Instant) {
        self.record(&CallRecord::new(method, RpcRole::Streaming(StreamSide::Server), start, status));
    }

    /// A proxied stream from a remote sidecar completed
    pub fn stream_client_request_sent(&self, method: &str, status: Code, start: Instant) {
        self.record(&CallRecord::new(method, RpcRole::Streaming(StreamSide::Client), start, status));
    }

    /// An app health probe completed
    pub fn app_health_probe_completed(&self, status: Code, start: Instant) {
        self.record(&CallRecord::new("", RpcRole::HealthProbe, start, status));
    }
}
