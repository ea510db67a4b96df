//! Measures, tag keys and views for gRPC call metrics.
//!
//! Measure names follow the OpenCensus gRPC plugin so existing dashboards
//! keep working against any compatible backend.

/// Dimension attached to a recorded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagKey(&'static str);

impl TagKey {
    pub const APP_ID: TagKey = TagKey("app_id");
    pub const SERVER_METHOD: TagKey = TagKey("grpc_server_method");
    pub const SERVER_STATUS: TagKey = TagKey("grpc_server_status");
    pub const CLIENT_METHOD: TagKey = TagKey("grpc_client_method");
    pub const CLIENT_STATUS: TagKey = TagKey("grpc_client_status");

    pub fn name(&self) -> &'static str {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Bytes,
    Milliseconds,
    Dimensionless,
}

impl Unit {
    /// UCUM symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Bytes => "By",
            Unit::Milliseconds => "ms",
            Unit::Dimensionless => "1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int64,
    Float64,
}

/// A recorded value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasureValue {
    Int(i64),
    Float(f64),
}

/// A named stream of values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measure {
    pub name: &'static str,
    pub description: &'static str,
    pub unit: Unit,
    pub kind: ValueKind,
}

impl Measure {
    const fn int(name: &'static str, description: &'static str, unit: Unit) -> Self {
        Self {
            name,
            description,
            unit,
            kind: ValueKind::Int64,
        }
    }

    const fn float(name: &'static str, description: &'static str, unit: Unit) -> Self {
        Self {
            name,
            description,
            unit,
            kind: ValueKind::Float64,
        }
    }
}

pub const SERVER_RECEIVED_BYTES: Measure = Measure::int(
    "grpc.io/server/received_bytes_per_rpc",
    "Total bytes received across all messages per RPC.",
    Unit::Bytes,
);
pub const SERVER_SENT_BYTES: Measure = Measure::int(
    "grpc.io/server/sent_bytes_per_rpc",
    "Total bytes sent in across all response messages per RPC.",
    Unit::Bytes,
);
pub const SERVER_LATENCY: Measure = Measure::float(
    "grpc.io/server/server_latency",
    "Time between first byte of request received to last byte of response sent, or terminal error.",
    Unit::Milliseconds,
);
pub const SERVER_COMPLETED_RPCS: Measure = Measure::int(
    "grpc.io/server/completed_rpcs",
    "Count of RPCs by method and status.",
    Unit::Dimensionless,
);
pub const CLIENT_SENT_BYTES: Measure = Measure::int(
    "grpc.io/client/sent_bytes_per_rpc",
    "Total bytes sent across all request messages per RPC.",
    Unit::Bytes,
);
pub const CLIENT_RECEIVED_BYTES: Measure = Measure::int(
    "grpc.io/client/received_bytes_per_rpc",
    "Total bytes received across all response messages per RPC.",
    Unit::Bytes,
);
pub const CLIENT_ROUNDTRIP_LATENCY: Measure = Measure::float(
    "grpc.io/client/roundtrip_latency",
    "Time between first byte of request sent to last byte of response received, or terminal error.",
    Unit::Milliseconds,
);
pub const CLIENT_COMPLETED_RPCS: Measure = Measure::int(
    "grpc.io/client/completed_rpcs",
    "Count of RPCs by method and status.",
    Unit::Dimensionless,
);
pub const HEALTH_PROBE_COMPLETED_COUNT: Measure = Measure::int(
    "grpc.io/healthprobes/completed_count",
    "Count of completed health probes",
    Unit::Dimensionless,
);
pub const HEALTH_PROBE_ROUNDTRIP_LATENCY: Measure = Measure::float(
    "grpc.io/healthprobes/roundtrip_latency",
    "Time between first byte of health probes sent to last byte of response received, or terminal error",
    Unit::Milliseconds,
);

/// Bucket bounds for byte counts, 1 KiB to 4 GiB
pub const DEFAULT_SIZE_DISTRIBUTION: &[f64] = &[
    1024.0,
    2048.0,
    4096.0,
    16384.0,
    65536.0,
    262144.0,
    1048576.0,
    4194304.0,
    16777216.0,
    67108864.0,
    268435456.0,
    1073741824.0,
    4294967296.0,
];

/// Bucket bounds for latencies in milliseconds
pub const DEFAULT_LATENCY_DISTRIBUTION: &[f64] = &[
    1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0, 13.0, 16.0, 20.0, 25.0, 30.0, 40.0, 50.0, 65.0, 80.0, 100.0, 130.0,
    160.0, 200.0, 250.0, 300.0, 400.0, 500.0, 650.0, 800.0, 1000.0, 2000.0, 5000.0, 10000.0, 20000.0, 50000.0,
    100000.0,
];

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Histogram with the given upper bucket bounds
    Distribution(Vec<f64>),
    /// Number of recorded values
    Count,
}

/// How a measure is aggregated and which tags it keeps
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub measure: Measure,
    pub tag_keys: Vec<TagKey>,
    pub aggregation: Aggregation,
}

impl View {
    pub fn new(measure: Measure, tag_keys: &[TagKey], aggregation: Aggregation) -> Self {
        Self {
            measure,
            tag_keys: tag_keys.to_vec(),
            aggregation,
        }
    }
}

/// The ten views recorded for gRPC calls
pub fn grpc_views(latency_distribution: &[f64]) -> Vec<View> {
    use TagKey as K;

    let size = || Aggregation::Distribution(DEFAULT_SIZE_DISTRIBUTION.to_vec());
    let latency = || Aggregation::Distribution(latency_distribution.to_vec());

    vec![
        View::new(SERVER_RECEIVED_BYTES, &[K::APP_ID, K::SERVER_METHOD], size()),
        View::new(SERVER_SENT_BYTES, &[K::APP_ID, K::SERVER_METHOD], size()),
        View::new(SERVER_LATENCY, &[K::APP_ID, K::SERVER_METHOD, K::SERVER_STATUS], latency()),
        View::new(SERVER_COMPLETED_RPCS, &[K::APP_ID, K::SERVER_METHOD, K::SERVER_STATUS], Aggregation::Count),
        View::new(CLIENT_SENT_BYTES, &[K::APP_ID, K::CLIENT_METHOD], size()),
        View::new(CLIENT_RECEIVED_BYTES, &[K::APP_ID, K::CLIENT_METHOD], size()),
        View::new(CLIENT_ROUNDTRIP_LATENCY, &[K::APP_ID, K::CLIENT_METHOD, K::CLIENT_STATUS], latency()),
        View::new(CLIENT_COMPLETED_RPCS, &[K::APP_ID, K::CLIENT_METHOD, K::CLIENT_STATUS], Aggregation::Count),
        View::new(HEALTH_PROBE_ROUNDTRIP_LATENCY, &[K::APP_ID, K::CLIENT_STATUS], latency()),
        View::new(HEALTH_PROBE_COMPLETED_COUNT, &[K::APP_ID, K::CLIENT_STATUS], Aggregation::Count),
    ]
}
