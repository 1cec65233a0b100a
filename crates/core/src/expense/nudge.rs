//! Nudge policy: owner reminders to founders who still owe a decision.
//!
//! The cooldown is a business rule evaluated against the same `now` as the
//! rest of the operation, so it is checked inside the expense transaction.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::expense::authorization::{Action, AuthorizationGate};
use crate::expense::error::ExpenseError;
use crate::expense::ledger::ApprovalLedger;
use crate::expense::quorum::QuorumPolicy;
use crate::expense::types::{Actor, ExpenseRef, ExpenseStatus, RosterEntry};

/// A successful nudge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NudgeOutcome {
    /// Value to store as the expense's `last_nudge_at`.
    pub nudged_at: DateTime<Utc>,
    /// Founders other than the owner with no approval yet.
    pub pending_founders: Vec<Uuid>,
}

/// Inputs of a nudge decision.
#[derive(Debug, Clone, Copy)]
pub struct NudgeRequest<'a> {
    /// The caller, if authenticated.
    pub actor: Option<&'a Actor>,
    /// Tenant and owner of the expense.
    pub expense: ExpenseRef,
    /// Current status.
    pub status: ExpenseStatus,
    /// When the owner last nudged, if ever.
    pub last_nudge_at: Option<DateTime<Utc>>,
    /// Minimum time between nudges.
    pub cooldown: Duration,
    /// Live company roster.
    pub roster: &'a [RosterEntry],
    /// Approval-phase ledger.
    pub approvals: &'a ApprovalLedger,
    /// The single authoritative instant for this operation.
    pub now: DateTime<Utc>,
}

/// Stateless nudge policy.
pub struct NudgePolicy;

impl NudgePolicy {
    /// Cooldown for a company, falling back to `default_hours` when unset.
    #[must_use]
    pub fn cooldown(company_hours: Option<u32>, default_hours: u32) -> Duration {
        Duration::hours(i64::from(company_hours.unwrap_or(default_hours)))
    }

    /// Decides whether the nudge may be sent.
    ///
    /// # Returns
    /// * `Ok(NudgeOutcome)` with the founders to remind
    /// * `Err(ExpenseError::InvalidState)` unless the expense is pending
    /// * `Err(ExpenseError::RateLimited)` with `retry_after = last + cooldown`
    ///   while the cooldown runs
    pub fn evaluate(request: &NudgeRequest<'_>) -> Result<NudgeOutcome, ExpenseError> {
        AuthorizationGate::authorize(request.actor, &request.expense, Action::Nudge)
            .into_result(&request.expense)?;

        if request.status != ExpenseStatus::PendingApproval {
            return Err(ExpenseError::InvalidState {
                status: request.status,
                action: Action::Nudge,
            });
        }

        if let Some(last) = request.last_nudge_at {
            // A cooldown past the calendar's end never elapses.
            let retry_after = last
                .checked_add_signed(request.cooldown)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if request.now < retry_after {
                return Err(ExpenseError::RateLimited { retry_after });
            }
        }

        Ok(NudgeOutcome {
            nudged_at: request.now,
            pending_founders: QuorumPolicy::pending_decision_makers(
                request.roster,
                request.expense.owner_id,
                request.approvals,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::ledger::Phase;
    use crate::expense::types::Role;
    use chrono::TimeZone;

    const A: Uuid = Uuid::from_u128(0xA);
    const B: Uuid = Uuid::from_u128(0xB);
    const C: Uuid = Uuid::from_u128(0xC);
    const COMPANY: Uuid = Uuid::from_u128(1);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap()
    }

    fn owner() -> Actor {
        Actor {
            user_id: A,
            company_id: COMPANY,
            role: Role::Founder,
        }
    }

    fn roster() -> Vec<RosterEntry> {
        [A, B, C]
            .into_iter()
            .map(|user_id| RosterEntry {
                user_id,
                role: Role::Founder,
            })
            .collect()
    }

    fn request<'a>(
        actor: &'a Actor,
        roster: &'a [RosterEntry],
        approvals: &'a ApprovalLedger,
        last_nudge_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> NudgeRequest<'a> {
        NudgeRequest {
            actor: Some(actor),
            expense: ExpenseRef {
                expense_id: Uuid::from_u128(100),
                company_id: COMPANY,
                owner_id: A,
            },
            status: ExpenseStatus::PendingApproval,
            last_nudge_at,
            cooldown: NudgePolicy::cooldown(None, 24),
            roster,
            approvals,
            now,
        }
    }

    #[test]
    fn test_first_nudge_lists_pending_founders() {
        let actor = owner();
        let roster = roster();
        let mut approvals = ApprovalLedger::new(Phase::Approval);
        approvals.record(B, t0()).unwrap();

        let outcome =
            NudgePolicy::evaluate(&request(&actor, &roster, &approvals, None, t0())).unwrap();
        assert_eq!(outcome.nudged_at, t0());
        assert_eq!(outcome.pending_founders, vec![C]);
    }

    #[test]
    fn test_second_nudge_within_cooldown_is_rate_limited() {
        let actor = owner();
        let roster = roster();
        let approvals = ApprovalLedger::new(Phase::Approval);

        let now = t0() + Duration::hours(1);
        let err = NudgePolicy::evaluate(&request(&actor, &roster, &approvals, Some(t0()), now))
            .unwrap_err();
        assert_eq!(err.retry_after(), Some(t0() + Duration::hours(24)));
    }

    #[test]
    fn test_nudge_allowed_exactly_at_cooldown() {
        let actor = owner();
        let roster = roster();
        let approvals = ApprovalLedger::new(Phase::Approval);

        let now = t0() + Duration::hours(24);
        assert!(
            NudgePolicy::evaluate(&request(&actor, &roster, &approvals, Some(t0()), now)).is_ok()
        );
    }

    #[test]
    fn test_oversized_cooldown_never_elapses() {
        let actor = owner();
        let roster = roster();
        let approvals = ApprovalLedger::new(Phase::Approval);
        let mut req = request(&actor, &roster, &approvals, Some(t0()), t0() + Duration::days(365));
        req.cooldown = NudgePolicy::cooldown(Some(u32::MAX), 24);

        let err = NudgePolicy::evaluate(&req).unwrap_err();
        assert_eq!(err.retry_after(), Some(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_nudge_requires_pending_status() {
        let actor = owner();
        let roster = roster();
        let approvals = ApprovalLedger::new(Phase::Approval);
        let mut req = request(&actor, &roster, &approvals, None, t0());
        req.status = ExpenseStatus::Approved;

        assert!(matches!(
            NudgePolicy::evaluate(&req),
            Err(ExpenseError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_only_owner_may_nudge() {
        let other = Actor {
            user_id: B,
            company_id: COMPANY,
            role: Role::Founder,
        };
        let roster = roster();
        let approvals = ApprovalLedger::new(Phase::Approval);

        assert!(matches!(
            NudgePolicy::evaluate(&request(&other, &roster, &approvals, None, t0())),
            Err(ExpenseError::Forbidden(_))
        ));
    }

    #[test]
    fn test_company_cooldown_overrides_default() {
        assert_eq!(NudgePolicy::cooldown(Some(6), 24), Duration::hours(6));
        assert_eq!(NudgePolicy::cooldown(None, 24), Duration::hours(24));
    }
}
