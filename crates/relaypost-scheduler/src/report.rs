//! Dispatch cycle reports and the failure taxonomy recorded on items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::ItemStatus;

/// Reason reported when a cycle is refused because another is running.
pub const SKIP_IN_PROGRESS: &str = "dispatch_in_progress";

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Scheduled,
}

/// Why a dispatch attempt did not fully succeed. `Display` is the summary
/// stored as the item's `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchFailure {
    #[error("no targets configured")]
    NoTargets,
    #[error("dispatch partially failed")]
    PartialDelivery { failed_targets: Vec<String> },
    #[error("dispatch failed for all targets")]
    TotalDelivery { failed_targets: Vec<String> },
    #[error("{0}")]
    Transport(String),
}

impl DispatchFailure {
    /// Classify per-target results. `None` when nothing failed.
    pub fn from_failed(attempted: usize, failed_targets: Vec<String>) -> Option<Self> {
        if failed_targets.is_empty() {
            None
        } else if failed_targets.len() >= attempted {
            Some(Self::TotalDelivery { failed_targets })
        } else {
            Some(Self::PartialDelivery { failed_targets })
        }
    }

    pub fn failed_targets(&self) -> Option<&[String]> {
        match self {
            Self::PartialDelivery { failed_targets } | Self::TotalDelivery { failed_targets } => {
                Some(failed_targets)
            }
            Self::NoTargets | Self::Transport(_) => None,
        }
    }
}

/// Where one reserved item ended up after the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    Sent,
    Rescheduled,
    Failed,
}

impl ItemOutcome {
    pub fn status(&self) -> ItemStatus {
        match self {
            ItemOutcome::Sent => ItemStatus::Sent,
            ItemOutcome::Rescheduled => ItemStatus::Queued,
            ItemOutcome::Failed => ItemStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub id: String,
    pub outcome: ItemOutcome,
    /// Targets a send was attempted to.
    pub targets: Vec<String>,
    /// Targets that did not accept the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_targets: Vec<String>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one dispatch cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub trigger: Trigger,
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub dry_run: bool,
    pub picked: usize,
    pub sent: usize,
    pub rescheduled: usize,
    pub failed: usize,
    /// Stale `processing` items moved back to `queued` before reserving.
    pub recovered: usize,
    pub results: Vec<ItemResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl DispatchReport {
    pub fn begin(trigger: Trigger, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            trigger,
            skipped: false,
            reason: None,
            dry_run,
            picked: 0,
            sent: 0,
            rescheduled: 0,
            failed: 0,
            recovered: 0,
            results: Vec::new(),
            started_at,
            completed_at: started_at,
        }
    }

    pub fn skipped(trigger: Trigger, dry_run: bool, at: DateTime<Utc>, reason: &str) -> Self {
        Self {
            skipped: true,
            reason: Some(reason.to_string()),
            ..Self::begin(trigger, dry_run, at)
        }
    }

    /// Count an item result and keep it.
    pub fn record(&mut self, result: ItemResult) {
        match result.outcome {
            ItemOutcome::Sent => self.sent += 1,
            ItemOutcome::Rescheduled => self.rescheduled += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
        self.results.push(result);
    }

    pub fn finish(mut self, completed_at: DateTime<Utc>) -> Self {
        self.completed_at = completed_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_summaries() {
        assert_eq!(DispatchFailure::NoTargets.to_string(), "no targets configured");
        assert_eq!(
            DispatchFailure::from_failed(2, vec!["grp-b".into()]).unwrap().to_string(),
            "dispatch partially failed"
        );
        assert_eq!(
            DispatchFailure::from_failed(2, vec!["grp-a".into(), "grp-b".into()])
                .unwrap()
                .to_string(),
            "dispatch failed for all targets"
        );
        assert!(DispatchFailure::from_failed(2, vec![]).is_none());
        assert_eq!(
            DispatchFailure::Transport("socket closed".into()).to_string(),
            "socket closed"
        );
    }

    #[test]
    fn test_record_counts() {
        let now = Utc::now();
        let mut report = DispatchReport::begin(Trigger::Manual, false, now);
        for outcome in [ItemOutcome::Sent, ItemOutcome::Failed, ItemOutcome::Rescheduled] {
            report.record(ItemResult {
                id: "x".into(),
                outcome,
                targets: vec![],
                failed_targets: vec![],
                summary: String::new(),
                error: None,
            });
        }
        assert_eq!((report.sent, report.failed, report.rescheduled), (1, 1, 1));
        assert_eq!(report.results.len(), 3);
    }

    #[test]
    fn test_skipped_report_shape() {
        let report = DispatchReport::skipped(Trigger::Scheduled, false, Utc::now(), SKIP_IN_PROGRESS);
        assert!(report.skipped);
        assert_eq!(report.picked, 0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["reason"], "dispatch_in_progress");
        assert_eq!(json["trigger"], "scheduled");
    }
}
