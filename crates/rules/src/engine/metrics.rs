use std::time::Duration;

use prometheus::{
    register_gauge_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry,
};

use crate::policy::PartialResponseStrategy;

/// Per-engine evaluation metrics. Every series carries a constant
/// `strategy` label so engines can share one registry.
#[derive(Clone)]
pub struct EngineMetrics {
    /// Rule evaluations by group.
    pub evaluations_total: IntCounterVec,
    /// Failed rule evaluations by group.
    pub evaluation_failures_total: IntCounterVec,
    /// Completed group iterations.
    pub group_iterations_total: IntCounterVec,
    /// Wall time of the last group iteration.
    pub group_last_duration_seconds: GaugeVec,
    /// Rules per loaded group.
    pub group_rules: IntGaugeVec,
}

fn opts(name: &str, help: &str, strategy: PartialResponseStrategy) -> Opts {
    Opts::new(name, help)
        .namespace("rulemux")
        .const_label("strategy", strategy.label())
}

impl EngineMetrics {
    pub fn new(
        strategy: PartialResponseStrategy,
        registry: &Registry,
    ) -> Result<Self, prometheus::Error> {
        let evaluations_total = register_int_counter_vec_with_registry!(
            opts("rule_evaluations_total", "Total rule evaluations", strategy),
            &["rule_group"],
            registry
        )?;

        let evaluation_failures_total = register_int_counter_vec_with_registry!(
            opts(
                "rule_evaluation_failures_total",
                "Total rule evaluations that returned an error",
                strategy
            ),
            &["rule_group"],
            registry
        )?;

        let group_iterations_total = register_int_counter_vec_with_registry!(
            opts(
                "rule_group_iterations_total",
                "Total scheduled group evaluations",
                strategy
            ),
            &["rule_group"],
            registry
        )?;

        let group_last_duration_seconds = register_gauge_vec_with_registry!(
            opts(
                "rule_group_last_duration_seconds",
                "Duration of the last group evaluation",
                strategy
            ),
            &["rule_group"],
            registry
        )?;

        let group_rules = register_int_gauge_vec_with_registry!(
            opts("rule_group_rules", "Number of rules in the group", strategy),
            &["rule_group"],
            registry
        )?;

        Ok(Self {
            evaluations_total,
            evaluation_failures_total,
            group_iterations_total,
            group_last_duration_seconds,
            group_rules,
        })
    }

    /// Record one finished group iteration.
    pub fn record_iteration(&self, group: &str, rules: usize, failures: usize, took: Duration) {
        self.group_iterations_total.with_label_values(&[group]).inc();
        self.evaluations_total
            .with_label_values(&[group])
            .inc_by(rules as u64);
        self.evaluation_failures_total
            .with_label_values(&[group])
            .inc_by(failures as u64);
        self.group_last_duration_seconds
            .with_label_values(&[group])
            .set(took.as_secs_f64());
    }

    pub fn set_group_rules(&self, group: &str, rules: usize) {
        self.group_rules.with_label_values(&[group]).set(rules as i64);
    }

    /// Drop series for a group that is no longer loaded.
    pub fn forget_group(&self, group: &str) {
        let _ = self.evaluations_total.remove_label_values(&[group]);
        let _ = self.evaluation_failures_total.remove_label_values(&[group]);
        let _ = self.group_iterations_total.remove_label_values(&[group]);
        let _ = self.group_last_duration_seconds.remove_label_values(&[group]);
        let _ = self.group_rules.remove_label_values(&[group]);
    }
}
