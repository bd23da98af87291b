//! Request statistics for proxied traffic.
//!
//! Counters are kept in a single document that is loaded, mutated and
//! persisted as a whole on every recorded request. The storage backend is
//! injected so the router never touches file paths directly.

use crate::error::ManagerError;
use crate::persist::{read_json, write_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

/// Maximum number of latency samples retained.
pub const MAX_LATENCY_SAMPLES: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Counts {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

impl Counts {
    fn bump(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelCounts {
    #[serde(flatten)]
    pub counts: Counts,
    pub total_latency_ms: f64,
    pub latency_count: u64,
}

impl ModelCounts {
    pub fn avg_latency(&self) -> f64 {
        if self.latency_count == 0 {
            0.0
        } else {
            self.total_latency_ms / self.latency_count as f64
        }
    }
}

/// The persisted statistics document. Missing fields load as defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    pub latency_samples_ms: VecDeque<f64>,
    pub by_provider: BTreeMap<String, Counts>,
    pub by_model: BTreeMap<String, ModelCounts>,
    pub start_time: DateTime<Utc>,
    pub last_request: Option<DateTime<Utc>>,
}

impl Default for RequestStats {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful: 0,
            failed: 0,
            latency_samples_ms: VecDeque::new(),
            by_provider: BTreeMap::new(),
            by_model: BTreeMap::new(),
            start_time: Utc::now(),
            last_request: None,
        }
    }
}

impl RequestStats {
    /// Apply one request outcome.
    pub fn apply(
        &mut self,
        success: bool,
        provider: Option<&str>,
        model: Option<&str>,
        latency_ms: Option<f64>,
    ) {
        self.total_requests += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }

        if let Some(latency) = latency_ms {
            self.latency_samples_ms.push_back(latency);
            while self.latency_samples_ms.len() > MAX_LATENCY_SAMPLES {
                self.latency_samples_ms.pop_front();
            }
        }

        if let Some(provider) = provider {
            self.by_provider.entry(provider.to_string()).or_default().bump(success);
        }

        if let Some(model) = model {
            let entry = self.by_model.entry(model.to_string()).or_default();
            entry.counts.bump(success);
            if let Some(latency) = latency_ms {
                entry.total_latency_ms += latency;
                entry.latency_count += 1;
            }
        }

        self.last_request = Some(Utc::now());
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful as f64 / self.total_requests as f64 * 100.0
        }
    }

    pub fn avg_latency(&self) -> f64 {
        if self.latency_samples_ms.is_empty() {
            0.0
        } else {
            self.latency_samples_ms.iter().sum::<f64>() / self.latency_samples_ms.len() as f64
        }
    }
}

/// Stats plus derived fields, as returned by `GET /api/stats`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub stats: RequestStats,
    pub success_rate: f64,
    pub avg_latency: f64,
}

impl From<RequestStats> for StatsSnapshot {
    fn from(stats: RequestStats) -> Self {
        Self {
            success_rate: stats.success_rate(),
            avg_latency: stats.avg_latency(),
            stats,
        }
    }
}

/// Storage for the stats document.
pub trait StatsBackend: Send + Sync {
    fn load(&self) -> Result<Option<RequestStats>, ManagerError>;
    fn save(&self, stats: &RequestStats) -> Result<(), ManagerError>;
}

/// Stats persisted as a JSON file.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StatsBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<RequestStats>, ManagerError> {
        match read_json(&self.path) {
            Ok(stats) => Ok(stats),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!(path = %self.path.display(), error = %e, "stats file unreadable, starting fresh");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, stats: &RequestStats) -> Result<(), ManagerError> {
        write_json(&self.path, stats).map_err(Into::into)
    }
}

/// In-memory stats, for tests and ephemeral servers.
#[derive(Default)]
pub struct MemoryBackend {
    stats: Mutex<Option<RequestStats>>,
}

impl StatsBackend for MemoryBackend {
    fn load(&self) -> Result<Option<RequestStats>, ManagerError> {
        Ok(self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, stats: &RequestStats) -> Result<(), ManagerError> {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner()) = Some(stats.clone());
        Ok(())
    }
}

/// Records request outcomes into a backend.
pub struct StatsRecorder {
    backend: Box<dyn StatsBackend>,
    lock: Mutex<()>,
}

impl StatsRecorder {
    pub fn new(backend: impl StatsBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    /// Load, update and persist the stats document.
    pub fn record_request(
        &self,
        success: bool,
        provider: Option<&str>,
        model: Option<&str>,
        latency_ms: Option<f64>,
    ) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut stats = self.backend.load()?.unwrap_or_default();
        stats.apply(success, provider, model, latency_ms);
        self.backend.save(&stats)
    }

    pub fn get_stats(&self) -> Result<StatsSnapshot, ManagerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.backend.load()?.unwrap_or_default().into())
    }

    /// Zero all counters and restart the clock.
    pub fn reset_stats(&self) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.backend.save(&RequestStats::default())?;
        tracing::info!("request stats reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_successes_and_failures() {
        let recorder = StatsRecorder::in_memory();
        for _ in 0..5 {
            recorder.record_request(true, None, None, None).unwrap();
        }
        for _ in 0..3 {
            recorder.record_request(false, None, None, None).unwrap();
        }

        let snapshot = recorder.get_stats().unwrap();
        assert_eq!(snapshot.stats.total_requests, 8);
        assert_eq!(snapshot.stats.successful, 5);
        assert_eq!(snapshot.stats.failed, 3);
        assert_eq!(snapshot.success_rate, 62.5);
    }

    #[test]
    fn latency_buffer_evicts_oldest_first() {
        let mut stats = RequestStats::default();
        for i in 0..150 {
            stats.apply(true, None, None, Some(i as f64));
        }

        assert_eq!(stats.latency_samples_ms.len(), MAX_LATENCY_SAMPLES);
        assert_eq!(stats.latency_samples_ms.front(), Some(&50.0));
        assert_eq!(stats.latency_samples_ms.back(), Some(&149.0));
    }

    #[test]
    fn empty_stats_have_zero_derived_fields() {
        let snapshot = StatsSnapshot::from(RequestStats::default());
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.avg_latency, 0.0);
    }

    #[test]
    fn reset_zeroes_everything() {
        let recorder = StatsRecorder::in_memory();
        recorder.record_request(true, Some("gemini"), Some("gemini-2.5-pro"), Some(120.0)).unwrap();
        recorder.reset_stats().unwrap();

        let snapshot = recorder.get_stats().unwrap();
        assert_eq!(snapshot.stats.total_requests, 0);
        assert_eq!(snapshot.stats.successful, 0);
        assert_eq!(snapshot.stats.failed, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.avg_latency, 0.0);
        assert!(snapshot.stats.by_provider.is_empty());
        assert!(snapshot.stats.last_request.is_none());
    }

    #[test]
    fn breaks_down_by_provider_and_model() {
        let mut stats = RequestStats::default();
        stats.apply(true, Some("gemini"), Some("gemini-2.5-pro"), Some(100.0));
        stats.apply(false, Some("gemini"), Some("gemini-2.5-pro"), Some(300.0));
        stats.apply(true, Some("claude"), Some("claude-sonnet-4"), None);

        assert_eq!(
            stats.by_provider["gemini"],
            Counts { total: 2, successful: 1, failed: 1 }
        );
        assert_eq!(stats.by_provider["claude"].successful, 1);
        assert_eq!(stats.by_model["gemini-2.5-pro"].avg_latency(), 200.0);
        assert_eq!(stats.by_model["claude-sonnet-4"].latency_count, 0);
        assert_eq!(stats.avg_latency(), 200.0);
        assert!(stats.last_request.is_some());
    }

    #[test]
    fn file_backend_persists_across_recorders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        StatsRecorder::new(JsonFileBackend::new(&path))
            .record_request(true, Some("codex"), Some("gpt-5"), Some(42.0))
            .unwrap();
        let snapshot = StatsRecorder::new(JsonFileBackend::new(&path)).get_stats().unwrap();

        assert_eq!(snapshot.stats.total_requests, 1);
        assert_eq!(snapshot.stats.by_provider["codex"].total, 1);
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(&path, "garbage").unwrap();

        let recorder = StatsRecorder::new(JsonFileBackend::new(&path));
        recorder.record_request(true, None, None, None).unwrap();

        assert_eq!(recorder.get_stats().unwrap().stats.total_requests, 1);
    }

    #[test]
    fn partial_document_keeps_its_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(
            &path,
            r#"{"totalRequests":5,"successful":4,"failed":1,"byModel":{"gpt-4o":{"total":2}}}"#,
        )
        .unwrap();

        let recorder = StatsRecorder::new(JsonFileBackend::new(&path));
        recorder.record_request(true, None, Some("gpt-4o"), Some(10.0)).unwrap();

        let stats = recorder.get_stats().unwrap().stats;
        assert_eq!(stats.total_requests, 6);
        assert_eq!(stats.successful, 5);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.by_model["gpt-4o"].counts.total, 3);
        assert_eq!(stats.by_model["gpt-4o"].latency_count, 1);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(StatsSnapshot::from(RequestStats::default())).unwrap();
        assert_eq!(json["totalRequests"], 0);
        assert_eq!(json["successRate"], 0.0);
        assert_eq!(json["avgLatency"], 0.0);
        assert!(json["latencySamplesMs"].is_array());
    }
}
