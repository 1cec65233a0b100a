//! Expense state machine.
//!
//! `ExpenseStateMachine::apply` is total over (status, command): every pair
//! yields either a `Transition` describing what to persist or a typed
//! `ExpenseError`. It reads the live roster and ledgers from the
//! `DecisionContext` and never touches storage itself.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::events::EventKind;
use crate::expense::authorization::{Action, AuthorizationGate};
use crate::expense::error::ExpenseError;
use crate::expense::ledger::{ApprovalLedger, LedgerEntry, Phase};
use crate::expense::quorum::QuorumPolicy;
use crate::expense::types::{Actor, Command, ExpenseRef, ExpenseStatus, Rejection, RosterEntry};
use crate::expense::validation::validate_reason;

/// Everything a lifecycle decision depends on, read inside one transaction.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    /// The caller, if authenticated.
    pub actor: Option<&'a Actor>,
    /// Tenant and owner of the expense.
    pub expense: ExpenseRef,
    /// Current status.
    pub status: ExpenseStatus,
    /// Live company roster.
    pub roster: &'a [RosterEntry],
    /// Approval-phase ledger.
    pub approvals: &'a ApprovalLedger,
    /// Withdrawal-phase ledger.
    pub withdrawal_approvals: &'a ApprovalLedger,
    /// The single authoritative instant for this operation.
    pub now: DateTime<Utc>,
}

/// The outcome of a legal command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Status before the command.
    pub from: ExpenseStatus,
    /// Status after the command. May equal `from` when quorum is not met.
    pub to: ExpenseStatus,
    /// Ledger row to insert, if any.
    pub ledger_entry: Option<(Phase, LedgerEntry)>,
    /// Rejection to record, if any.
    pub rejection: Option<Rejection>,
    /// Approvals the affected phase needs, from the live roster.
    pub approvals_needed: usize,
    /// Events to publish once the transition commits.
    pub events: Vec<EventKind>,
}

impl Transition {
    /// Returns true if the status changes.
    #[must_use]
    pub fn changes_status(&self) -> bool {
        self.from != self.to
    }
}

/// Outcome of submitting a new expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Status to store the new expense with.
    pub status: ExpenseStatus,
    /// Approvals the expense needs, from the live roster.
    pub approvals_needed: usize,
    /// Events to publish once the expense is stored.
    pub events: Vec<EventKind>,
}

/// Stateless expense lifecycle state machine.
pub struct ExpenseStateMachine;

impl ExpenseStateMachine {
    /// Decides the initial status of a new expense.
    ///
    /// # Arguments
    /// * `owner_id` - The submitting user
    /// * `roster` - Live roster of the owner's company
    ///
    /// # Returns
    /// `PendingApproval`, or `Approved` directly when no founder other than
    /// the owner exists.
    #[must_use]
    pub fn submit(owner_id: Uuid, roster: &[RosterEntry]) -> Submission {
        let approvals_needed = QuorumPolicy::approvals_needed(roster, owner_id);

        if approvals_needed == 0 {
            debug!(%owner_id, "no other founder, auto-approving at submission");
            return Submission {
                status: ExpenseStatus::Approved,
                approvals_needed,
                events: vec![EventKind::Submitted, EventKind::Approved],
            };
        }

        Submission {
            status: ExpenseStatus::PendingApproval,
            approvals_needed,
            events: vec![EventKind::Submitted],
        }
    }

    /// Applies `command` to the expense described by `ctx`.
    ///
    /// Checks run in this order: authorization, current status, payload,
    /// then the ledger.
    ///
    /// # Returns
    /// * `Ok(Transition)` describing what to persist and publish
    /// * `Err(ExpenseError::InvalidState)` if `command` is not legal from the
    ///   current status
    /// * `Err(ExpenseError::DuplicateDecision)` if the actor already approved
    ///   in this phase
    pub fn apply(ctx: &DecisionContext<'_>, command: &Command) -> Result<Transition, ExpenseError> {
        let action = command.action();
        AuthorizationGate::authorize(ctx.actor, &ctx.expense, action).into_result(&ctx.expense)?;
        let actor = ctx.actor.ok_or(ExpenseError::Unauthenticated)?;

        match (ctx.status, command) {
            (ExpenseStatus::PendingApproval, Command::Approve) => Self::record_approval(
                ctx,
                actor,
                ctx.approvals,
                ExpenseStatus::Approved,
                EventKind::ApprovalRecorded,
                EventKind::Approved,
            ),
            (ExpenseStatus::PendingApproval, Command::Reject { reason }) => Self::reject(
                ctx,
                actor,
                reason,
                ExpenseStatus::Rejected,
                EventKind::Rejected,
            ),
            (ExpenseStatus::Approved, Command::RequestWithdrawal) => {
                Ok(Self::request_withdrawal(ctx))
            }
            (ExpenseStatus::WithdrawalRequested, Command::ApproveWithdrawal) => {
                Self::record_approval(
                    ctx,
                    actor,
                    ctx.withdrawal_approvals,
                    ExpenseStatus::WithdrawalApproved,
                    EventKind::WithdrawalApprovalRecorded,
                    EventKind::WithdrawalApproved,
                )
            }
            (ExpenseStatus::WithdrawalRequested, Command::RejectWithdrawal { reason }) => {
                Self::reject(
                    ctx,
                    actor,
                    reason,
                    ExpenseStatus::WithdrawalRejected,
                    EventKind::WithdrawalRejected,
                )
            }
            (ExpenseStatus::WithdrawalApproved, Command::ConfirmReceipt) => Ok(Transition {
                from: ctx.status,
                to: ExpenseStatus::Received,
                ledger_entry: None,
                rejection: None,
                approvals_needed: 0,
                events: vec![EventKind::Received],
            }),
            (status, _) => Err(ExpenseError::InvalidState { status, action }),
        }
    }

    /// Checks the owner may still edit the expense details.
    pub fn ensure_editable(
        actor: Option<&Actor>,
        expense: &ExpenseRef,
        status: ExpenseStatus,
    ) -> Result<(), ExpenseError> {
        AuthorizationGate::authorize(actor, expense, Action::Edit).into_result(expense)?;
        if !status.is_editable() {
            return Err(ExpenseError::InvalidState {
                status,
                action: Action::Edit,
            });
        }
        Ok(())
    }

    /// Checks the owner may still delete the expense.
    pub fn ensure_deletable(
        actor: Option<&Actor>,
        expense: &ExpenseRef,
        status: ExpenseStatus,
    ) -> Result<(), ExpenseError> {
        AuthorizationGate::authorize(actor, expense, Action::Delete).into_result(expense)?;
        if !status.is_deletable() {
            return Err(ExpenseError::InvalidState {
                status,
                action: Action::Delete,
            });
        }
        Ok(())
    }

    /// Approvals still relevant for the phase the expense is in.
    ///
    /// Zero once the expense has left both decision phases.
    #[must_use]
    pub fn approvals_needed_now(
        status: ExpenseStatus,
        owner_id: Uuid,
        roster: &[RosterEntry],
    ) -> usize {
        match status {
            ExpenseStatus::PendingApproval | ExpenseStatus::WithdrawalRequested => {
                QuorumPolicy::approvals_needed(roster, owner_id)
            }
            _ => 0,
        }
    }

    /// Re-evaluates quorum for an open expense after the roster changed.
    ///
    /// Returns the status to advance to and the event to publish when the
    /// ledger of the current phase now meets the live quorum, including the
    /// zero case. `None` for any other status or while approvals are missing.
    #[must_use]
    pub fn settle(
        status: ExpenseStatus,
        owner_id: Uuid,
        roster: &[RosterEntry],
        approvals: &ApprovalLedger,
        withdrawal_approvals: &ApprovalLedger,
    ) -> Option<(ExpenseStatus, EventKind)> {
        let (ledger, reached, event) = match status {
            ExpenseStatus::PendingApproval => {
                (approvals, ExpenseStatus::Approved, EventKind::Approved)
            }
            ExpenseStatus::WithdrawalRequested => (
                withdrawal_approvals,
                ExpenseStatus::WithdrawalApproved,
                EventKind::WithdrawalApproved,
            ),
            _ => return None,
        };

        let needed = QuorumPolicy::approvals_needed(roster, owner_id);
        QuorumPolicy::is_met(ledger, needed).then_some((reached, event))
    }

    fn record_approval(
        ctx: &DecisionContext<'_>,
        actor: &Actor,
        ledger: &ApprovalLedger,
        reached: ExpenseStatus,
        recorded_event: EventKind,
        reached_event: EventKind,
    ) -> Result<Transition, ExpenseError> {
        let needed = QuorumPolicy::approvals_needed(ctx.roster, ctx.expense.owner_id);

        let mut updated = ledger.clone();
        let entry = updated.record(actor.user_id, ctx.now)?;

        let (to, event) = if QuorumPolicy::is_met(&updated, needed) {
            (reached, reached_event)
        } else {
            (ctx.status, recorded_event)
        };

        debug!(
            expense_id = %ctx.expense.expense_id,
            approver_id = %actor.user_id,
            phase = %ledger.phase(),
            approvals = updated.distinct_count(),
            needed,
            "approval recorded"
        );

        Ok(Transition {
            from: ctx.status,
            to,
            ledger_entry: Some((ledger.phase(), entry)),
            rejection: None,
            approvals_needed: needed,
            events: vec![event],
        })
    }

    fn reject(
        ctx: &DecisionContext<'_>,
        actor: &Actor,
        raw_reason: &str,
        to: ExpenseStatus,
        event: EventKind,
    ) -> Result<Transition, ExpenseError> {
        let reason = validate_reason(raw_reason)?;

        Ok(Transition {
            from: ctx.status,
            to,
            ledger_entry: None,
            rejection: Some(Rejection {
                rejected_by: actor.user_id,
                rejected_at: ctx.now,
                reason,
            }),
            approvals_needed: QuorumPolicy::approvals_needed(ctx.roster, ctx.expense.owner_id),
            events: vec![event],
        })
    }

    fn request_withdrawal(ctx: &DecisionContext<'_>) -> Transition {
        let needed = QuorumPolicy::approvals_needed(ctx.roster, ctx.expense.owner_id);

        let (to, events) = if needed == 0 {
            (
                ExpenseStatus::WithdrawalApproved,
                vec![EventKind::WithdrawalRequested, EventKind::WithdrawalApproved],
            )
        } else {
            (
                ExpenseStatus::WithdrawalRequested,
                vec![EventKind::WithdrawalRequested],
            )
        };

        Transition {
            from: ctx.status,
            to,
            ledger_entry: None,
            rejection: None,
            approvals_needed: needed,
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::types::Role;
    use chrono::TimeZone;

    const A: Uuid = Uuid::from_u128(0xA);
    const B: Uuid = Uuid::from_u128(0xB);
    const C: Uuid = Uuid::from_u128(0xC);
    const M: Uuid = Uuid::from_u128(0xD);
    const COMPANY: Uuid = Uuid::from_u128(1);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    fn actor(user_id: Uuid, role: Role) -> Actor {
        Actor {
            user_id,
            company_id: COMPANY,
            role,
        }
    }

    fn founder(user_id: Uuid) -> RosterEntry {
        RosterEntry {
            user_id,
            role: Role::Founder,
        }
    }

    fn roster() -> Vec<RosterEntry> {
        vec![
            founder(A),
            founder(B),
            founder(C),
            RosterEntry {
                user_id: M,
                role: Role::Member,
            },
        ]
    }

    fn expense() -> ExpenseRef {
        ExpenseRef {
            expense_id: Uuid::from_u128(100),
            company_id: COMPANY,
            owner_id: A,
        }
    }

    struct Fixture {
        status: ExpenseStatus,
        roster: Vec<RosterEntry>,
        approvals: ApprovalLedger,
        withdrawal_approvals: ApprovalLedger,
    }

    impl Fixture {
        fn new(status: ExpenseStatus) -> Self {
            Self {
                status,
                roster: roster(),
                approvals: ApprovalLedger::new(Phase::Approval),
                withdrawal_approvals: ApprovalLedger::new(Phase::Withdrawal),
            }
        }

        fn apply(&mut self, who: &Actor, command: &Command) -> Result<Transition, ExpenseError> {
            let ctx = DecisionContext {
                actor: Some(who),
                expense: expense(),
                status: self.status,
                roster: &self.roster,
                approvals: &self.approvals,
                withdrawal_approvals: &self.withdrawal_approvals,
                now: now(),
            };
            let transition = ExpenseStateMachine::apply(&ctx, command)?;
            if let Some((phase, entry)) = transition.ledger_entry {
                let ledger = match phase {
                    Phase::Approval => &mut self.approvals,
                    Phase::Withdrawal => &mut self.withdrawal_approvals,
                };
                ledger.record(entry.approver_id, entry.approved_at)?;
            }
            self.status = transition.to;
            Ok(transition)
        }
    }

    #[test]
    fn test_three_founder_full_lifecycle() {
        let a = actor(A, Role::Founder);
        let b = actor(B, Role::Founder);
        let c = actor(C, Role::Founder);
        let mut fx = Fixture::new(ExpenseStatus::PendingApproval);

        let t = fx.apply(&b, &Command::Approve).unwrap();
        assert_eq!(t.to, ExpenseStatus::PendingApproval);
        assert_eq!(t.approvals_needed, 2);
        assert_eq!(t.events, vec![EventKind::ApprovalRecorded]);
        assert_eq!(fx.approvals.distinct_count(), 1);

        let t = fx.apply(&c, &Command::Approve).unwrap();
        assert_eq!(t.to, ExpenseStatus::Approved);
        assert_eq!(t.events, vec![EventKind::Approved]);
        assert_eq!(fx.approvals.distinct_count(), 2);

        let t = fx.apply(&a, &Command::RequestWithdrawal).unwrap();
        assert_eq!(t.to, ExpenseStatus::WithdrawalRequested);

        let t = fx.apply(&b, &Command::ApproveWithdrawal).unwrap();
        assert_eq!(t.to, ExpenseStatus::WithdrawalRequested);

        let t = fx.apply(&c, &Command::ApproveWithdrawal).unwrap();
        assert_eq!(t.to, ExpenseStatus::WithdrawalApproved);

        let t = fx.apply(&a, &Command::ConfirmReceipt).unwrap();
        assert_eq!(t.to, ExpenseStatus::Received);
        assert!(fx.status.is_terminal());
    }

    #[test]
    fn test_duplicate_approval_is_reported() {
        let b = actor(B, Role::Founder);
        let mut fx = Fixture::new(ExpenseStatus::PendingApproval);
        fx.apply(&b, &Command::Approve).unwrap();

        let err = fx.apply(&b, &Command::Approve).unwrap_err();
        assert!(matches!(
            err,
            ExpenseError::DuplicateDecision {
                phase: Phase::Approval,
                ..
            }
        ));
        assert_eq!(fx.approvals.distinct_count(), 1);
        assert_eq!(fx.status, ExpenseStatus::PendingApproval);
    }

    #[test]
    fn test_reject_records_trimmed_reason() {
        let b = actor(B, Role::Founder);
        let mut fx = Fixture::new(ExpenseStatus::PendingApproval);

        let t = fx
            .apply(
                &b,
                &Command::Reject {
                    reason: "  not a business cost ".into(),
                },
            )
            .unwrap();
        assert_eq!(t.to, ExpenseStatus::Rejected);
        let rejection = t.rejection.unwrap();
        assert_eq!(rejection.reason, "not a business cost");
        assert_eq!(rejection.rejected_by, B);
        assert_eq!(rejection.rejected_at, now());
    }

    #[test]
    fn test_blank_reason_is_validation_error() {
        let b = actor(B, Role::Founder);
        let mut fx = Fixture::new(ExpenseStatus::WithdrawalRequested);
        let err = fx
            .apply(
                &b,
                &Command::RejectWithdrawal {
                    reason: "   ".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ExpenseError::Validation(_)));
        assert_eq!(fx.status, ExpenseStatus::WithdrawalRequested);
    }

    #[test]
    fn test_withdrawal_rejected_is_terminal() {
        let a = actor(A, Role::Founder);
        let b = actor(B, Role::Founder);
        let mut fx = Fixture::new(ExpenseStatus::WithdrawalRequested);
        fx.apply(
            &b,
            &Command::RejectWithdrawal {
                reason: "no".into(),
            },
        )
        .unwrap();

        let err = fx.apply(&a, &Command::RequestWithdrawal).unwrap_err();
        assert!(matches!(
            err,
            ExpenseError::InvalidState {
                status: ExpenseStatus::WithdrawalRejected,
                ..
            }
        ));
    }

    #[test]
    fn test_withdrawal_auto_approves_without_other_founders() {
        let a = actor(A, Role::Founder);
        let mut fx = Fixture::new(ExpenseStatus::Approved);
        fx.roster = vec![founder(A)];

        let t = fx.apply(&a, &Command::RequestWithdrawal).unwrap();
        assert_eq!(t.to, ExpenseStatus::WithdrawalApproved);
        assert_eq!(t.approvals_needed, 0);
        assert_eq!(
            t.events,
            vec![EventKind::WithdrawalRequested, EventKind::WithdrawalApproved]
        );
        assert_eq!(fx.withdrawal_approvals.distinct_count(), 0);
    }

    #[test]
    fn test_quorum_follows_live_roster() {
        let b = actor(B, Role::Founder);
        let mut fx = Fixture::new(ExpenseStatus::PendingApproval);
        // C demoted after submission: only B is still needed.
        fx.roster[2].role = Role::Member;

        let t = fx.apply(&b, &Command::Approve).unwrap();
        assert_eq!(t.approvals_needed, 1);
        assert_eq!(t.to, ExpenseStatus::Approved);
    }

    #[test]
    fn test_owner_cannot_approve_own_expense() {
        let a = actor(A, Role::Founder);
        let mut fx = Fixture::new(ExpenseStatus::PendingApproval);
        let err = fx.apply(&a, &Command::Approve).unwrap_err();
        assert!(matches!(err, ExpenseError::Forbidden(_)));
        assert_eq!(fx.approvals.distinct_count(), 0);
    }

    #[test]
    fn test_member_cannot_reject() {
        let m = actor(M, Role::Member);
        let mut fx = Fixture::new(ExpenseStatus::PendingApproval);
        let err = fx
            .apply(
                &m,
                &Command::Reject {
                    reason: "no".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ExpenseError::Forbidden(_)));
    }

    #[test]
    fn test_approving_approved_expense_is_invalid_state() {
        let b = actor(B, Role::Founder);
        let mut fx = Fixture::new(ExpenseStatus::Approved);
        let err = fx.apply(&b, &Command::Approve).unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert!(matches!(
            err,
            ExpenseError::InvalidState {
                status: ExpenseStatus::Approved,
                action: Action::Approve
            }
        ));
    }

    #[test]
    fn test_unauthenticated_context() {
        let roster = roster();
        let approvals = ApprovalLedger::new(Phase::Approval);
        let withdrawal_approvals = ApprovalLedger::new(Phase::Withdrawal);
        let ctx = DecisionContext {
            actor: None,
            expense: expense(),
            status: ExpenseStatus::PendingApproval,
            roster: &roster,
            approvals: &approvals,
            withdrawal_approvals: &withdrawal_approvals,
            now: now(),
        };
        assert!(matches!(
            ExpenseStateMachine::apply(&ctx, &Command::Approve),
            Err(ExpenseError::Unauthenticated)
        ));
    }

    #[test]
    fn test_submit_solo_founder_auto_approves() {
        let solo = vec![founder(A)];
        let submission = ExpenseStateMachine::submit(A, &solo);
        assert_eq!(submission.status, ExpenseStatus::Approved);
        assert_eq!(submission.approvals_needed, 0);
        assert_eq!(
            submission.events,
            vec![EventKind::Submitted, EventKind::Approved]
        );
    }

    #[test]
    fn test_submit_by_member_needs_every_founder() {
        let submission = ExpenseStateMachine::submit(M, &roster());
        assert_eq!(submission.status, ExpenseStatus::PendingApproval);
        assert_eq!(submission.approvals_needed, 3);
    }

    #[test]
    fn test_edit_and_delete_windows() {
        let a = actor(A, Role::Founder);
        let b = actor(B, Role::Founder);
        let target = expense();

        assert!(
            ExpenseStateMachine::ensure_editable(Some(&a), &target, ExpenseStatus::Approved)
                .is_ok()
        );
        assert!(matches!(
            ExpenseStateMachine::ensure_editable(
                Some(&a),
                &target,
                ExpenseStatus::WithdrawalRequested
            ),
            Err(ExpenseError::InvalidState { .. })
        ));
        assert!(matches!(
            ExpenseStateMachine::ensure_deletable(Some(&a), &target, ExpenseStatus::Approved),
            Err(ExpenseError::InvalidState { .. })
        ));
        assert!(matches!(
            ExpenseStateMachine::ensure_deletable(
                Some(&b),
                &target,
                ExpenseStatus::PendingApproval
            ),
            Err(ExpenseError::Forbidden(_))
        ));
    }

    #[test]
    fn test_settle_after_demotion_completes_quorum() {
        let mut approvals = ApprovalLedger::new(Phase::Approval);
        approvals.record(B, now()).unwrap();
        let withdrawals = ApprovalLedger::new(Phase::Withdrawal);

        let mut shrunk = roster();
        assert_eq!(
            ExpenseStateMachine::settle(
                ExpenseStatus::PendingApproval,
                A,
                &shrunk,
                &approvals,
                &withdrawals
            ),
            None
        );

        shrunk[2].role = Role::Member;
        assert_eq!(
            ExpenseStateMachine::settle(
                ExpenseStatus::PendingApproval,
                A,
                &shrunk,
                &approvals,
                &withdrawals
            ),
            Some((ExpenseStatus::Approved, EventKind::Approved))
        );
    }

    #[test]
    fn test_settle_with_no_founder_left_auto_completes() {
        let approvals = ApprovalLedger::new(Phase::Approval);
        let withdrawals = ApprovalLedger::new(Phase::Withdrawal);
        let solo = vec![founder(A)];

        assert_eq!(
            ExpenseStateMachine::settle(
                ExpenseStatus::WithdrawalRequested,
                A,
                &solo,
                &approvals,
                &withdrawals
            ),
            Some((ExpenseStatus::WithdrawalApproved, EventKind::WithdrawalApproved))
        );
        assert_eq!(
            ExpenseStateMachine::settle(
                ExpenseStatus::Approved,
                A,
                &solo,
                &approvals,
                &withdrawals
            ),
            None
        );
    }
}
