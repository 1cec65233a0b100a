//! Property-based tests for QuorumPolicy.

use proptest::prelude::*;
use uuid::Uuid;

use crate::expense::ledger::{ApprovalLedger, Phase};
use crate::expense::quorum::QuorumPolicy;
use crate::expense::types::{Role, RosterEntry};

/// Strategy for a roster of 1..8 founders and 0..5 members with unique ids.
fn arb_roster() -> impl Strategy<Value = (usize, Vec<RosterEntry>)> {
    (1usize..8, 0usize..5).prop_map(|(founders, members)| {
        let roster = (0..founders + members)
            .map(|i| RosterEntry {
                user_id: Uuid::from_u128(i as u128 + 1),
                role: if i < founders {
                    Role::Founder
                } else {
                    Role::Member
                },
            })
            .collect();
        (founders, roster)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // =========================================================================
    // approvals_needed is N-1 for a founder owner, N for anyone else
    // =========================================================================

    #[test]
    fn prop_approvals_needed_excludes_owner(
        (founders, roster) in arb_roster(),
        pick in any::<prop::sample::Index>(),
    ) {
        let owner = roster[pick.index(roster.len())];
        let needed = QuorumPolicy::approvals_needed(&roster, owner.user_id);

        match owner.role {
            Role::Founder => prop_assert_eq!(needed, founders - 1),
            Role::Member => prop_assert_eq!(needed, founders),
        }
    }

    #[test]
    fn prop_outsider_owner_needs_every_founder((founders, roster) in arb_roster()) {
        let outsider = Uuid::from_u128(u128::MAX);
        prop_assert_eq!(QuorumPolicy::approvals_needed(&roster, outsider), founders);
    }

    // =========================================================================
    // pending decision makers shrink as the ledger grows
    // =========================================================================

    #[test]
    fn prop_pending_plus_decided_covers_eligible(
        (_founders, roster) in arb_roster(),
        approved_mask in prop::collection::vec(any::<bool>(), 13),
    ) {
        let owner = roster[0].user_id;
        let mut ledger = ApprovalLedger::new(Phase::Approval);
        for (entry, approve) in roster.iter().zip(&approved_mask) {
            if *approve && entry.role == Role::Founder && entry.user_id != owner {
                ledger.record(entry.user_id, chrono::Utc::now()).unwrap();
            }
        }

        let needed = QuorumPolicy::approvals_needed(&roster, owner);
        let pending = QuorumPolicy::pending_decision_makers(&roster, owner, &ledger);

        prop_assert_eq!(pending.len() + ledger.distinct_count(), needed);
        prop_assert!(!pending.contains(&owner));
        prop_assert_eq!(QuorumPolicy::is_met(&ledger, needed), pending.is_empty());
    }
}
