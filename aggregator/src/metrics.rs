use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CYCLES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "aggregator_cycles_total",
        "Total sampling cycles completed"
    ))
    .unwrap();
    pub static ref SENSOR_UNAVAILABLE_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "aggregator_sensor_unavailable_total",
            "Cycles in which a sensor had nothing to report"
        ),
        &["sensor"]
    )
    .unwrap();
    pub static ref TRANSPORT_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "aggregator_transport_failures_total",
            "Sensor transport failures (device missing or unreachable)"
        ),
        &["sensor"]
    )
    .unwrap();
    pub static ref STORE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "aggregator_store_failures_total",
        "Reading appends that failed permanently"
    ))
    .unwrap();
    pub static ref CYCLE_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "aggregator_cycle_latency_seconds",
            "Wall time of one full acquisition-and-store cycle"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    )
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY.register(Box::new(CYCLES_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(SENSOR_UNAVAILABLE_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(TRANSPORT_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(STORE_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CYCLE_LATENCY_SECONDS.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
