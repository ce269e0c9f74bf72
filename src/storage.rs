use chrono::Utc;
use std::cmp::Reverse;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{RequestLog, RunSummary, TestRunRecord};

/// Run types that are kept in the history
const RECORDED_KINDS: [&str; 2] = ["protected", "unprotected"];

#[derive(Debug, Default)]
struct Inner {
    test_runs: Vec<TestRunRecord>,
    request_logs: Vec<RequestLog>,
}

/// Process-lifetime store of completed runs and their per-request logs
#[derive(Debug, Default)]
pub struct ResultStore {
    inner: RwLock<Inner>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether runs of this type are recorded
    pub fn records(kind: &str) -> bool {
        RECORDED_KINDS.iter().any(|k| k.eq_ignore_ascii_case(kind))
    }

    /// Append a completed run, returning the stored record
    ///
    /// Runs whose type is neither protected nor unprotected are not kept and
    /// yield `None`.
    pub async fn save_test_run(&self, summary: &RunSummary) -> Option<TestRunRecord> {
        if !Self::records(&summary.kind) {
            return None;
        }
        let protected = summary.kind.eq_ignore_ascii_case("protected");

        let mut inner = self.inner.write().await;
        let created_at = Utc::now();
        let record = TestRunRecord {
            id: inner.test_runs.len() as u64 + 1,
            created_at,
            protected_url: protected.then(|| summary.url.clone()),
            unprotected_url: (!protected).then(|| summary.url.clone()),
            num_requests: summary.total_requests,
            result: summary.clone(),
        };

        let first_log_id = inner.request_logs.len() as u64 + 1;
        let logs = summary.requests.iter().enumerate().map(|(offset, probe)| RequestLog {
            id: first_log_id + offset as u64,
            test_run_id: record.id,
            kind: summary.kind.clone(),
            url: summary.url.clone(),
            status: probe.status,
            time_in_seconds: probe.time.to_string(),
            request_id: probe.id,
            success: probe.is_success(),
            created_at,
        });
        inner.request_logs.extend(logs);
        inner.test_runs.push(record.clone());

        debug!(
            event = "test_run_saved",
            test_run_id = record.id,
            kind = summary.kind.as_str(),
            requests = summary.requests.len(),
            message = "Stored test run"
        );

        Some(record)
    }

    /// Most recent runs, newest first
    pub async fn recent_test_runs(&self, limit: usize) -> Vec<TestRunRecord> {
        let inner = self.inner.read().await;
        let mut order: Vec<&TestRunRecord> = inner.test_runs.iter().collect();
        order.sort_by_key(|r| Reverse((r.created_at, r.id)));
        order.into_iter().take(limit).cloned().collect()
    }

    /// Request logs of one run ordered by request id, or `None` for an unknown run
    pub async fn request_logs(&self, test_run_id: u64) -> Option<Vec<RequestLog>> {
        let inner = self.inner.read().await;
        if !inner.test_runs.iter().any(|r| r.id == test_run_id) {
            return None;
        }

        let mut logs: Vec<RequestLog> = inner
            .request_logs
            .iter()
            .filter(|log| log.test_run_id == test_run_id)
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.request_id);
        Some(logs)
    }
}
