use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub claims_total: IntCounterVec,
    pub transitions_total: IntCounterVec,
    pub dispatch_queue_depth: IntGauge,
    pub dispatch_offers_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub notification_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let claims_total = IntCounterVec::new(
            Opts::new("claims_total", "Claim attempts by outcome"),
            &["outcome"],
        )
        .expect("valid claims_total metric");

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Status transitions by outcome"),
            &["outcome"],
        )
        .expect("valid transitions_total metric");

        let dispatch_queue_depth =
            IntGauge::new("dispatch_queue_depth", "Orders waiting in the dispatch queue")
                .expect("valid dispatch_queue_depth metric");

        let dispatch_offers_total = IntCounterVec::new(
            Opts::new("dispatch_offers_total", "Dispatch offers by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_offers_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of dispatch processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let notification_failures_total = IntCounter::new(
            "notification_failures_total",
            "Status card deliveries that failed (logged, never fatal)",
        )
        .expect("valid notification_failures_total metric");

        registry
            .register(Box::new(claims_total.clone()))
            .expect("register claims_total");
        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(dispatch_queue_depth.clone()))
            .expect("register dispatch_queue_depth");
        registry
            .register(Box::new(dispatch_offers_total.clone()))
            .expect("register dispatch_offers_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(notification_failures_total.clone()))
            .expect("register notification_failures_total");

        Self {
            registry,
            claims_total,
            transitions_total,
            dispatch_queue_depth,
            dispatch_offers_total,
            dispatch_latency_seconds,
            notification_failures_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
