//! Property-based tests for ExpenseStateMachine.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use crate::expense::authorization::Action;
use crate::expense::error::ExpenseError;
use crate::expense::ledger::{ApprovalLedger, Phase};
use crate::expense::service::{DecisionContext, ExpenseStateMachine};
use crate::expense::types::{Actor, Command, ExpenseRef, ExpenseStatus, Role, RosterEntry};

const COMPANY: Uuid = Uuid::from_u128(1);
const OWNER: Uuid = Uuid::from_u128(2);

/// Strategy for generating random ExpenseStatus values.
fn arb_status() -> impl Strategy<Value = ExpenseStatus> {
    prop::sample::select(ExpenseStatus::ALL.to_vec())
}

/// Strategy for generating random roles.
fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Founder), Just(Role::Member)]
}

/// Strategy for generating commands with a valid reason.
fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Approve),
        "[a-z]{1,20}".prop_map(|reason| Command::Reject { reason }),
        Just(Command::RequestWithdrawal),
        Just(Command::ApproveWithdrawal),
        "[a-z]{1,20}".prop_map(|reason| Command::RejectWithdrawal { reason }),
        Just(Command::ConfirmReceipt),
    ]
}

fn founders(count: u128) -> Vec<RosterEntry> {
    (0..count)
        .map(|i| RosterEntry {
            user_id: Uuid::from_u128(OWNER.as_u128() + i),
            role: Role::Founder,
        })
        .collect()
}

fn founder_actor(user_id: Uuid) -> Actor {
    Actor {
        user_id,
        company_id: COMPANY,
        role: Role::Founder,
    }
}

fn expense() -> ExpenseRef {
    ExpenseRef {
        expense_id: Uuid::from_u128(100),
        company_id: COMPANY,
        owner_id: OWNER,
    }
}

fn is_legal(status: ExpenseStatus, command: &Command) -> bool {
    matches!(
        (status, command),
        (ExpenseStatus::PendingApproval, Command::Approve | Command::Reject { .. })
            | (ExpenseStatus::Approved, Command::RequestWithdrawal)
            | (
                ExpenseStatus::WithdrawalRequested,
                Command::ApproveWithdrawal | Command::RejectWithdrawal { .. }
            )
            | (ExpenseStatus::WithdrawalApproved, Command::ConfirmReceipt)
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // =========================================================================
    // The owner can never decide on their own expense, under any role
    // =========================================================================

    #[test]
    fn prop_owner_never_decides(
        status in arb_status(),
        role in arb_role(),
        command in prop_oneof![
            Just(Command::Approve),
            Just(Command::Reject { reason: "x".into() }),
            Just(Command::ApproveWithdrawal),
            Just(Command::RejectWithdrawal { reason: "x".into() }),
        ],
    ) {
        let owner = Actor { user_id: OWNER, company_id: COMPANY, role };
        let roster = founders(3);
        let approvals = ApprovalLedger::new(Phase::Approval);
        let withdrawal_approvals = ApprovalLedger::new(Phase::Withdrawal);
        let ctx = DecisionContext {
            actor: Some(&owner),
            expense: expense(),
            status,
            roster: &roster,
            approvals: &approvals,
            withdrawal_approvals: &withdrawal_approvals,
            now: Utc::now(),
        };

        let result = ExpenseStateMachine::apply(&ctx, &command);
        prop_assert!(matches!(result, Err(ExpenseError::Forbidden(_))));
    }

    // =========================================================================
    // The transition function is total
    // =========================================================================

    /// Every (status, command) pair by an eligible actor yields a transition
    /// or InvalidState, and terminal statuses never move.
    #[test]
    fn prop_transition_is_total(status in arb_status(), command in arb_command()) {
        let approver = founder_actor(Uuid::from_u128(OWNER.as_u128() + 1));
        let owner = founder_actor(OWNER);
        let actor = match command.action() {
            Action::RequestWithdrawal | Action::ConfirmReceipt => owner,
            _ => approver,
        };
        let roster = founders(3);
        let approvals = ApprovalLedger::new(Phase::Approval);
        let withdrawal_approvals = ApprovalLedger::new(Phase::Withdrawal);
        let ctx = DecisionContext {
            actor: Some(&actor),
            expense: expense(),
            status,
            roster: &roster,
            approvals: &approvals,
            withdrawal_approvals: &withdrawal_approvals,
            now: Utc::now(),
        };

        match ExpenseStateMachine::apply(&ctx, &command) {
            Ok(transition) => {
                prop_assert!(is_legal(status, &command));
                prop_assert!(!status.is_terminal());
                prop_assert_eq!(transition.from, status);
            }
            Err(ExpenseError::InvalidState { status: reported, .. }) => {
                prop_assert!(!is_legal(status, &command));
                prop_assert_eq!(reported, status);
            }
            Err(other) => prop_assert!(false, "unexpected error {other:?}"),
        }
    }

    // =========================================================================
    // Quorum needs distinct approvers
    // =========================================================================

    /// Replays random approval attempts (with repeats); the expense is
    /// APPROVED exactly when distinct approvers reach approvals_needed.
    #[test]
    fn prop_approved_only_with_distinct_quorum(
        founder_count in 2u128..6,
        attempts in prop::collection::vec(1u128..6, 1..12),
    ) {
        let roster = founders(founder_count);
        let needed = usize::try_from(founder_count - 1).unwrap();
        let withdrawal_approvals = ApprovalLedger::new(Phase::Withdrawal);
        let mut approvals = ApprovalLedger::new(Phase::Approval);
        let mut status = ExpenseStatus::PendingApproval;
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        for offset in attempts {
            if offset >= founder_count {
                continue;
            }
            let actor = founder_actor(Uuid::from_u128(OWNER.as_u128() + offset));
            let ctx = DecisionContext {
                actor: Some(&actor),
                expense: expense(),
                status,
                roster: &roster,
                approvals: &approvals,
                withdrawal_approvals: &withdrawal_approvals,
                now,
            };

            match ExpenseStateMachine::apply(&ctx, &Command::Approve) {
                Ok(transition) => {
                    let (_, entry) = transition.ledger_entry.unwrap();
                    approvals.record(entry.approver_id, entry.approved_at).unwrap();
                    status = transition.to;
                }
                Err(ExpenseError::DuplicateDecision { .. }) => {
                    prop_assert!(approvals.has_decided(actor.user_id));
                }
                Err(ExpenseError::InvalidState { .. }) => {
                    prop_assert_eq!(status, ExpenseStatus::Approved);
                }
                Err(other) => prop_assert!(false, "unexpected error {other:?}"),
            }

            prop_assert_eq!(
                status == ExpenseStatus::Approved,
                approvals.distinct_count() >= needed
            );
        }
    }

    // =========================================================================
    // Rejection reasons round-trip minus surrounding whitespace
    // =========================================================================

    #[test]
    fn prop_reason_round_trips_trimmed(
        pad_left in "[ \t]{0,3}",
        body in "[a-zA-Z0-9][a-zA-Z0-9 ,.]{0,60}[a-zA-Z0-9.]",
        pad_right in "[ \t\n]{0,3}",
    ) {
        let approver = founder_actor(Uuid::from_u128(OWNER.as_u128() + 1));
        let roster = founders(2);
        let approvals = ApprovalLedger::new(Phase::Approval);
        let withdrawal_approvals = ApprovalLedger::new(Phase::Withdrawal);
        let ctx = DecisionContext {
            actor: Some(&approver),
            expense: expense(),
            status: ExpenseStatus::PendingApproval,
            roster: &roster,
            approvals: &approvals,
            withdrawal_approvals: &withdrawal_approvals,
            now: Utc::now(),
        };

        let command = Command::Reject { reason: format!("{pad_left}{body}{pad_right}") };
        let transition = ExpenseStateMachine::apply(&ctx, &command).unwrap();
        prop_assert_eq!(transition.rejection.unwrap().reason, body);
    }

    #[test]
    fn prop_whitespace_reason_always_rejected(reason in "[ \t\n]{0,10}") {
        let approver = founder_actor(Uuid::from_u128(OWNER.as_u128() + 1));
        let roster = founders(2);
        let approvals = ApprovalLedger::new(Phase::Approval);
        let withdrawal_approvals = ApprovalLedger::new(Phase::Withdrawal);
        let ctx = DecisionContext {
            actor: Some(&approver),
            expense: expense(),
            status: ExpenseStatus::WithdrawalRequested,
            roster: &roster,
            approvals: &approvals,
            withdrawal_approvals: &withdrawal_approvals,
            now: Utc::now(),
        };

        let result = ExpenseStateMachine::apply(&ctx, &Command::RejectWithdrawal { reason });
        prop_assert!(matches!(result, Err(ExpenseError::Validation(_))));
    }

    // =========================================================================
    // Zero approvals needed at withdrawal request auto-approves
    // =========================================================================

    #[test]
    fn prop_solo_founder_withdrawal_auto_approves(members in 0usize..4) {
        let owner = founder_actor(OWNER);
        let mut roster = founders(1);
        roster.extend((0..members).map(|i| RosterEntry {
            user_id: Uuid::from_u128(1000 + i as u128),
            role: Role::Member,
        }));
        let approvals = ApprovalLedger::new(Phase::Approval);
        let withdrawal_approvals = ApprovalLedger::new(Phase::Withdrawal);
        let ctx = DecisionContext {
            actor: Some(&owner),
            expense: expense(),
            status: ExpenseStatus::Approved,
            roster: &roster,
            approvals: &approvals,
            withdrawal_approvals: &withdrawal_approvals,
            now: Utc::now(),
        };

        let transition = ExpenseStateMachine::apply(&ctx, &Command::RequestWithdrawal).unwrap();
        prop_assert_eq!(transition.to, ExpenseStatus::WithdrawalApproved);
        prop_assert!(transition.ledger_entry.is_none());
    }
}
