//! Approval ledger.
//!
//! Append-only record of who approved an expense (or its withdrawal). At most
//! one entry exists per approver and phase; a second attempt is reported as
//! `DuplicateDecision` instead of being silently absorbed.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::expense::error::ExpenseError;

/// Which decision round a ledger belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Approval of the expense itself.
    Approval,
    /// Countersigning of the withdrawal.
    Withdrawal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approval => f.write_str("approval"),
            Self::Withdrawal => f.write_str("withdrawal"),
        }
    }
}

/// One recorded approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// The approving founder.
    pub approver_id: Uuid,
    /// When the approval was recorded.
    pub approved_at: DateTime<Utc>,
}

/// Approvals recorded for one expense in one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalLedger {
    phase: Phase,
    entries: Vec<LedgerEntry>,
    approvers: BTreeSet<Uuid>,
}

impl ApprovalLedger {
    /// Creates an empty ledger for `phase`.
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            entries: Vec::new(),
            approvers: BTreeSet::new(),
        }
    }

    /// Rebuilds a ledger from stored rows.
    ///
    /// Rows are expected to be unique per approver already; a repeated
    /// approver is kept once.
    #[must_use]
    pub fn from_entries(phase: Phase, rows: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let mut ledger = Self::new(phase);
        for entry in rows {
            if ledger.approvers.insert(entry.approver_id) {
                ledger.entries.push(entry);
            }
        }
        ledger
    }

    /// The phase this ledger records.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns true if `approver_id` already approved in this phase.
    #[must_use]
    pub fn has_decided(&self, approver_id: Uuid) -> bool {
        self.approvers.contains(&approver_id)
    }

    /// Number of distinct approvers.
    #[must_use]
    pub fn distinct_count(&self) -> usize {
        self.approvers.len()
    }

    /// Recorded entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Appends an approval, refusing a second one from the same approver.
    pub fn record(
        &mut self,
        approver_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<LedgerEntry, ExpenseError> {
        if !self.approvers.insert(approver_id) {
            return Err(ExpenseError::DuplicateDecision {
                approver_id,
                phase: self.phase,
            });
        }

        let entry = LedgerEntry {
            approver_id,
            approved_at: at,
        };
        self.entries.push(entry);
        Ok(entry)
    }
}
