//! Prometheus-compatible metrics for the Kestrel server.
//!
//! Counters are kept here; gauges (uptime, bus traffic, plugin states) are
//! read from the [`AgentService`] at render time.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kestrel_runtime::AgentService;

#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    http_requests_total: AtomicU64,
    http_errors_total: AtomicU64,
    actions_invoked_total: AtomicU64,
    action_errors_total: AtomicU64,
    model_turns_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_http_requests(&self) {
        self.inner
            .http_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_errors(&self) {
        self.inner.http_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action(&self, is_error: bool) {
        self.inner
            .actions_invoked_total
            .fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.inner
                .action_errors_total
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_model_turns(&self) {
        self.inner.model_turns_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render_prometheus(&self, service: &AgentService) -> String {
        let m = &self.inner;
        let mut out = String::new();

        gauge(
            &mut out,
            "kestrel_uptime_seconds",
            "Time since the agent service was created.",
            service.uptime().as_secs(),
        );
        counter(
            &mut out,
            "kestrel_http_requests_total",
            "Total HTTP requests served.",
            m.http_requests_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "kestrel_http_errors_total",
            "Total HTTP errors (4xx/5xx).",
            m.http_errors_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "kestrel_bus_messages_total",
            "Total messages published on the bus.",
            service.bus().published_count(),
        );
        gauge(
            &mut out,
            "kestrel_bus_subscribers",
            "Handlers currently subscribed to the bus.",
            service.bus().subscriber_count() as u64,
        );
        gauge(
            &mut out,
            "kestrel_actions_registered",
            "Actions currently registered with the dispatcher.",
            service.dispatcher().action_count() as u64,
        );
        counter(
            &mut out,
            "kestrel_http_actions_total",
            "Actions invoked through the HTTP API.",
            m.actions_invoked_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "kestrel_http_action_errors_total",
            "Actions invoked through the HTTP API that failed.",
            m.action_errors_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "kestrel_model_turns_total",
            "Model turns run through the HTTP API.",
            m.model_turns_total.load(Ordering::Relaxed),
        );

        let mut by_state: BTreeMap<&'static str, u64> = BTreeMap::new();
        for status in service.plugin_status() {
            *by_state.entry(status.state).or_default() += 1;
        }
        let _ = writeln!(out, "# HELP kestrel_plugins Registered plugins by lifecycle state.");
        let _ = writeln!(out, "# TYPE kestrel_plugins gauge");
        for (state, count) in by_state {
            let _ = writeln!(out, "kestrel_plugins{{state=\"{state}\"}} {count}");
        }
        out
    }
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    metric(out, name, help, "counter", value);
}

fn gauge(out: &mut String, name: &str, help: &str, value: u64) {
    metric(out, name, help, "gauge", value);
}

fn metric(out: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}\n");
}
