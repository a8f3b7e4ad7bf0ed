use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

static CONNECTED_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "notification_hub_connected_clients",
        "Recipients currently registered with the hub",
    )
    .expect("failed to create notification_hub_connected_clients");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register notification_hub_connected_clients");
    gauge
});

static REGISTRATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_hub_registrations_total",
            "Registrations processed by the hub loop",
        ),
        &["outcome"],
    )
    .expect("failed to create notification_hub_registrations_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_hub_registrations_total");
    counter
});

static DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_hub_deliveries_total",
            "Connection writes attempted by the hub loop",
        ),
        &["scope", "outcome"],
    )
    .expect("failed to create notification_hub_deliveries_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_hub_deliveries_total");
    counter
});

static EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notification_hub_evictions_total",
        "Connections removed after a failed write",
    )
    .expect("failed to create notification_hub_evictions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_hub_evictions_total");
    counter
});

static BRIDGE_MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_hub_bridge_messages_total",
            "Backbone messages seen by the bridge",
        ),
        &["outcome"],
    )
    .expect("failed to create notification_hub_bridge_messages_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_hub_bridge_messages_total");
    counter
});

static PUBLISHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_hub_publishes_total",
            "Envelopes handed to the publisher",
        ),
        &["outcome"],
    )
    .expect("failed to create notification_hub_publishes_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_hub_publishes_total");
    counter
});

pub fn set_connected_clients(count: usize) {
    CONNECTED_CLIENTS.set(count as i64);
}

pub fn observe_registration(outcome: &str) {
    REGISTRATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn observe_delivery(scope: &str, delivered: bool) {
    let outcome = if delivered { "delivered" } else { "failed" };
    DELIVERIES_TOTAL.with_label_values(&[scope, outcome]).inc();
}

pub fn observe_eviction() {
    EVICTIONS_TOTAL.inc();
}

pub fn observe_bridge_message(outcome: &str) {
    BRIDGE_MESSAGES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn observe_publish(outcome: &str) {
    PUBLISHES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Render the default registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_hub_metrics() {
        observe_registration("accepted");
        observe_delivery("broadcast", true);
        observe_eviction();
        observe_bridge_message("forwarded");
        observe_publish("sent");
        set_connected_clients(0);

        let text = render().unwrap();
        assert!(text.contains("notification_hub_registrations_total"));
        assert!(text.contains("notification_hub_deliveries_total"));
        assert!(text.contains("notification_hub_evictions_total"));
        assert!(text.contains("notification_hub_bridge_messages_total"));
        assert!(text.contains("notification_hub_publishes_total"));
        assert!(text.contains("notification_hub_connected_clients"));
    }
}
