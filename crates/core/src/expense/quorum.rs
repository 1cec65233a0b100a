//! Quorum policy.
//!
//! The number of approvals a phase needs is the number of founders on the
//! live roster other than the expense owner. It is recomputed for every
//! decision, never cached on the expense.

use uuid::Uuid;

use crate::expense::error::ExpenseError;
use crate::expense::ledger::ApprovalLedger;
use crate::expense::types::{Role, RosterEntry};

/// Stateless quorum policy.
pub struct QuorumPolicy;

impl QuorumPolicy {
    /// Founders in `roster`, excluding `exclude_user_id`.
    #[must_use]
    pub fn approvals_needed(roster: &[RosterEntry], exclude_user_id: Uuid) -> usize {
        Self::eligible_approvers(roster, exclude_user_id).count()
    }

    /// Returns true once `ledger` holds at least `needed` distinct approvers.
    ///
    /// Zero needed is always met.
    #[must_use]
    pub fn is_met(ledger: &ApprovalLedger, needed: usize) -> bool {
        ledger.distinct_count() >= needed
    }

    /// Founders other than the owner who have not approved in `ledger`.
    #[must_use]
    pub fn pending_decision_makers(
        roster: &[RosterEntry],
        owner_id: Uuid,
        ledger: &ApprovalLedger,
    ) -> Vec<Uuid> {
        Self::eligible_approvers(roster, owner_id)
            .filter(|id| !ledger.has_decided(*id))
            .collect()
    }

    /// Refuses a role change that would leave the company without a founder.
    pub fn ensure_founder_remains(
        roster: &[RosterEntry],
        user_id: Uuid,
        new_role: Role,
    ) -> Result<(), ExpenseError> {
        if new_role == Role::Founder {
            return Ok(());
        }

        let remaining = roster
            .iter()
            .filter(|m| m.role == Role::Founder && m.user_id != user_id)
            .count();

        if remaining == 0 {
            return Err(ExpenseError::Validation(
                "a company must keep at least one founder".to_string(),
            ));
        }

        Ok(())
    }

    fn eligible_approvers(
        roster: &[RosterEntry],
        exclude_user_id: Uuid,
    ) -> impl Iterator<Item = Uuid> + '_ {
        roster
            .iter()
            .filter(move |m| m.role == Role::Founder && m.user_id != exclude_user_id)
            .map(|m| m.user_id)
    }
}
