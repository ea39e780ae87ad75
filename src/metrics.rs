// src/metrics.rs
//! Prometheus counters, compiled in with the `metrics` feature. Without it the
//! recording helpers are no-ops.

#[cfg(feature = "metrics")]
mod prom {
    use once_cell::sync::Lazy;
    use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

    pub static FEEDS_KEPT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
        register_int_counter!("funded_feeds_kept_total", "Feeds eligible after a pass")
            .expect("register funded_feeds_kept_total")
    });

    pub static FEEDS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "funded_feeds_dropped_total", "Feeds filtered out", &["reason"] // unsupported|decode|fetch|funds|depleted|window|threshold
        )
        .expect("register funded_feeds_dropped_total")
    });
}

#[cfg(feature = "metrics")]
pub use prom::{FEEDS_DROPPED_TOTAL, FEEDS_KEPT_TOTAL};

#[inline]
pub fn feed_kept() {
    #[cfg(feature = "metrics")]
    FEEDS_KEPT_TOTAL.inc();
}

#[inline]
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn feed_dropped(reason: &str) {
    #[cfg(feature = "metrics")]
    FEEDS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}
