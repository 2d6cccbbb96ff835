// ── Engram: Metrics ────────────────────────────────────────────────────────
//
// Lock-free counters plus a bounded rolling window of retrieval latencies.
// Shared as Arc<MetricsRegistry> by every component; `snapshot()` produces
// the serialisable view returned by `metrics()`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Named counters. Each maps to one AtomicU64 in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Stores,
    StorageFailures,
    DegradedEmbeddings,
    ConceptLinkFailures,
    Retrievals,
    RetrievalFailures,
    FallbackKeyword,
    AccessUpdateFailures,
    LifecycleConflicts,
    LifecycleSkipped,
    DecayCycles,
    ConsolidationCycles,
    ArchivalCycles,
}

const COUNTERS: usize = 13;

impl Counter {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Decay,
    Consolidation,
    Archival,
}

pub struct MetricsRegistry {
    counters: [AtomicU64; COUNTERS],
    last_cycle_ms: [AtomicU64; 3],
    latencies_us: Mutex<VecDeque<u64>>,
    window: usize,
}

/// Point-in-time copy of every metric.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub stores: u64,
    pub storage_failures: u64,
    pub degraded_embeddings: u64,
    pub concept_link_failures: u64,
    pub retrievals: u64,
    pub retrieval_failures: u64,
    pub fallback_keyword: u64,
    pub access_update_failures: u64,
    pub lifecycle_conflicts: u64,
    pub lifecycle_skipped: u64,
    pub decay_cycles: u64,
    pub consolidation_cycles: u64,
    pub archival_cycles: u64,
    pub last_decay_ms: u64,
    pub last_consolidation_ms: u64,
    pub last_archival_ms: u64,
    pub retrieval_latency: LatencySummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencySummary {
    pub samples: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl MetricsRegistry {
    pub fn new(window: usize) -> Self {
        Self {
            counters: Default::default(),
            last_cycle_ms: Default::default(),
            latencies_us: Mutex::new(VecDeque::with_capacity(window.min(4096))),
            window: window.max(1),
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        self.counters[counter.index()].fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    pub fn record_latency(&self, elapsed: Duration) {
        let mut window = self.latencies_us.lock();
        if window.len() == self.window {
            window.pop_front();
        }
        window.push_back(elapsed.as_micros() as u64);
    }

    pub fn record_cycle(&self, cycle: Cycle, elapsed: Duration) {
        let (counter, slot) = match cycle {
            Cycle::Decay => (Counter::DecayCycles, 0),
            Cycle::Consolidation => (Counter::ConsolidationCycles, 1),
            Cycle::Archival => (Counter::ArchivalCycles, 2),
        };
        self.incr(counter);
        self.last_cycle_ms[slot].store(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn latency_summary(&self) -> LatencySummary {
        let mut samples: Vec<u64> = self.latencies_us.lock().iter().copied().collect();
        if samples.is_empty() {
            return LatencySummary::default();
        }
        samples.sort_unstable();
        let pct = |p: f64| -> f64 {
            let rank = ((p * samples.len() as f64).ceil() as usize).clamp(1, samples.len());
            samples[rank - 1] as f64 / 1000.0
        };
        LatencySummary {
            samples: samples.len(),
            p50_ms: pct(0.50),
            p95_ms: pct(0.95),
            p99_ms: pct(0.99),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stores: self.get(Counter::Stores),
            storage_failures: self.get(Counter::StorageFailures),
            degraded_embeddings: self.get(Counter::DegradedEmbeddings),
            concept_link_failures: self.get(Counter::ConceptLinkFailures),
            retrievals: self.get(Counter::Retrievals),
            retrieval_failures: self.get(Counter::RetrievalFailures),
            fallback_keyword: self.get(Counter::FallbackKeyword),
            access_update_failures: self.get(Counter::AccessUpdateFailures),
            lifecycle_conflicts: self.get(Counter::LifecycleConflicts),
            lifecycle_skipped: self.get(Counter::LifecycleSkipped),
            decay_cycles: self.get(Counter::DecayCycles),
            consolidation_cycles: self.get(Counter::ConsolidationCycles),
            archival_cycles: self.get(Counter::ArchivalCycles),
            last_decay_ms: self.last_cycle_ms[0].load(Ordering::Relaxed),
            last_consolidation_ms: self.last_cycle_ms[1].load(Ordering::Relaxed),
            last_archival_ms: self.last_cycle_ms[2].load(Ordering::Relaxed),
            retrieval_latency: self.latency_summary(),
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new(crate::atoms::constants::DEFAULT_LATENCY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = MetricsRegistry::default();
        m.incr(Counter::Retrievals);
        m.add(Counter::Retrievals, 2);
        m.incr(Counter::FallbackKeyword);
        let s = m.snapshot();
        assert_eq!(s.retrievals, 3);
        assert_eq!(s.fallback_keyword, 1);
        assert_eq!(s.storage_failures, 0);
    }

    #[test]
    fn latency_window_is_bounded_and_percentiles_ordered() {
        let m = MetricsRegistry::new(10);
        for ms in 1..=20u64 {
            m.record_latency(Duration::from_millis(ms));
        }
        let l = m.latency_summary();
        assert_eq!(l.samples, 10);
        assert_eq!(l.p50_ms, 15.0);
        assert_eq!(l.p99_ms, 20.0);
        assert!(l.p50_ms <= l.p95_ms && l.p95_ms <= l.p99_ms);
    }

    #[test]
    fn cycles_record_count_and_duration() {
        let m = MetricsRegistry::default();
        m.record_cycle(Cycle::Consolidation, Duration::from_millis(42));
        let s = m.snapshot();
        assert_eq!(s.consolidation_cycles, 1);
        assert_eq!(s.last_consolidation_ms, 42);
    }
}
