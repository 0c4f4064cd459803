//! Composer Metrics
//!
//! Prometheus counters for allocation, assembly and reconciliation outcomes,
//! kept in a private registry so several composers can coexist in tests.

use crate::error::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Outcome label for the lifecycle counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }

    pub fn of<T, E>(result: &std::result::Result<T, E>) -> Self {
        if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// Outcome label for resolved delegated creations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Matched,
    Failed,
    TimedOut,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Matched => "matched",
            ReconcileOutcome::Failed => "failed",
            ReconcileOutcome::TimedOut => "timed_out",
        }
    }
}

pub struct ComposerMetrics {
    registry: Registry,
    allocations: IntCounterVec,
    assemblies: IntCounterVec,
    disassemblies: IntCounterVec,
    reconciliations: IntCounterVec,
    pending_creations: IntGauge,
}

impl std::fmt::Debug for ComposerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposerMetrics")
            .field("pending_creations", &self.pending_creations.get())
            .finish()
    }
}

fn outcome_counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), &["outcome"])?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl ComposerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let allocations = outcome_counter(
            &registry,
            "composer_allocations_total",
            "Composed node allocation requests",
        )?;
        let assemblies = outcome_counter(
            &registry,
            "composer_assemblies_total",
            "Composed node assembly requests",
        )?;
        let disassemblies = outcome_counter(
            &registry,
            "composer_disassemblies_total",
            "Composed node disassembly requests",
        )?;
        let reconciliations = outcome_counter(
            &registry,
            "composer_reconciliations_total",
            "Delegated remote target creations resolved by the reconciler",
        )?;
        let pending_creations = IntGauge::new(
            "composer_pending_target_creations",
            "Delegated remote target creations awaiting reconciliation",
        )?;
        registry.register(Box::new(pending_creations.clone()))?;

        Ok(Self {
            registry,
            allocations,
            assemblies,
            disassemblies,
            reconciliations,
            pending_creations,
        })
    }

    pub fn record_allocation(&self, outcome: Outcome) {
        self.allocations.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn record_assembly(&self, outcome: Outcome) {
        self.assemblies.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn record_disassembly(&self, outcome: Outcome) {
        self.disassemblies.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn record_reconciliation(&self, outcome: ReconcileOutcome) {
        self.reconciliations
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn set_pending_creations(&self, count: usize) {
        self.pending_creations.set(count as i64);
    }

    pub fn reconciliations(&self, outcome: ReconcileOutcome) -> u64 {
        self.reconciliations
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Render every metric in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
