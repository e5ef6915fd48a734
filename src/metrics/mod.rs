//! Prometheus counters for cache synchronization
//!
//! Collectors live on a crate-local [`REGISTRY`]; the host process decides
//! whether and how to expose it.


use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;

pub(crate) const OUTCOME_APPLIED: &str = "applied";
pub(crate) const OUTCOME_WRITE_FAILED: &str = "write_failed";
pub(crate) const OUTCOME_PARSE_FAILED: &str = "parse_failed";
pub(crate) const OUTCOME_LOCAL_RELOAD: &str = "local_reload";

lazy_static! {
    /// Cache synchronizations by outcome and remote key
    pub static ref SYNC_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("hub_config_sync_total", "Cache synchronizations by outcome"),
        &["key", "outcome"]
    )
    .expect("metric can not be created");

    /// Watch streams re-established after a break
    pub static ref WATCH_RESUBSCRIBE_TOTAL: IntCounter = IntCounter::new(
        "hub_config_watch_resubscribe_total",
        "Watch streams re-established after a break"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry
            .register(Box::new(SYNC_TOTAL.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(WATCH_RESUBSCRIBE_TOTAL.clone()))
            .expect("collector can be registered");
        registry
    };
}

pub(crate) fn record_sync(
    key: &str,
    outcome: &str,
) {
    SYNC_TOTAL.with_label_values(&[key, outcome]).inc();
}

pub(crate) fn record_resubscribe() {
    WATCH_RESUBSCRIBE_TOTAL.inc();
}
