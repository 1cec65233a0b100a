//! Expense repository: the transactional boundary of the expense lifecycle.
//!
//! Every state change runs as one unit of work:
//! 1. lock the expense row (`SELECT ... FOR UPDATE`)
//! 2. read the live roster and both ledgers
//! 3. ask `ExpenseStateMachine` for a decision
//! 4. insert the ledger row, if any (unique on expense and approver)
//! 5. write the new status guarded by a `version` compare-and-swap
//! 6. commit, then publish events
//!
//! The unique index is the arbiter for duplicate approvals and the version
//! check for lost updates, so the rules also hold on stores without row locks.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cofound_core::clock::Clock;
use cofound_core::events::{EventBus, EventKind, ExpenseEvent};
use cofound_core::expense::{
    Action, Actor, ApprovalLedger, AuthorizationGate, Command, DecisionContext, ExpenseDraft,
    ExpenseError, ExpensePatch, ExpenseRef, ExpenseStateMachine, ExpenseStatus, LedgerEntry,
    NudgePolicy, NudgeRequest, Phase, RosterEntry,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, UpdateMany,
};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::entities::{
    approvals, companies, expenses, sea_orm_active_enums::ExpenseStatusDb, withdrawal_approvals,
};

use super::company::cooldown_hours;
use super::{db_error, is_unique_violation, load_actor, load_roster};

/// An expense with both ledgers.
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseDetails {
    /// The expense row.
    pub expense: expenses::Model,
    /// Approval-phase ledger, oldest first.
    pub approvals: Vec<approvals::Model>,
    /// Withdrawal-phase ledger, oldest first.
    pub withdrawal_approvals: Vec<withdrawal_approvals::Model>,
    /// Approvals the current phase needs, from the live roster.
    pub approvals_needed: usize,
}

/// Result of a nudge.
#[derive(Debug, Clone, Serialize)]
pub struct NudgeReport {
    /// The nudged expense.
    pub expense_id: Uuid,
    /// When the nudge was recorded.
    pub nudged_at: DateTime<Utc>,
    /// Founders who still owe a decision.
    pub pending_founders: Vec<Uuid>,
}

/// Expense repository.
#[derive(Clone)]
pub struct ExpenseRepository {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    default_cooldown_hours: u32,
}

impl fmt::Debug for ExpenseRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpenseRepository")
            .field("default_cooldown_hours", &self.default_cooldown_hours)
            .finish_non_exhaustive()
    }
}

impl ExpenseRepository {
    /// Creates a new expense repository.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        clock: Arc<dyn Clock>,
        bus: EventBus,
        default_cooldown_hours: u32,
    ) -> Self {
        Self {
            db,
            clock,
            bus,
            default_cooldown_hours,
        }
    }

    /// Submits a new expense on behalf of `actor_id`.
    ///
    /// The expense is stored `PENDING_APPROVAL`, or `APPROVED` directly when
    /// no founder other than the owner exists.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed draft, `Unauthenticated` for an
    /// unknown actor.
    pub async fn submit(
        &self,
        actor_id: Uuid,
        draft: ExpenseDraft,
    ) -> Result<ExpenseDetails, ExpenseError> {
        let draft = draft.validated()?;
        let now = self.clock.now();

        let txn = self.db.begin().await.map_err(db_error)?;
        let actor = load_actor(&txn, actor_id).await?;
        AuthorizationGate::authorize_company(Some(&actor), actor.company_id, Action::Submit)?;

        let company = find_company(&txn, actor.company_id).await?;
        let roster = load_roster(&txn, actor.company_id).await?;
        let submission = ExpenseStateMachine::submit(actor.user_id, &roster);

        let expense = expenses::ActiveModel {
            id: Set(Uuid::now_v7()),
            company_id: Set(actor.company_id),
            owner_id: Set(actor.user_id),
            amount: Set(draft.amount),
            currency: Set(company.currency),
            category: Set(draft.category),
            expense_date: Set(draft.date),
            description: Set(draft.description),
            status: Set(submission.status.into()),
            rejected_by: Set(None),
            rejected_at: Set(None),
            rejection_reason: Set(None),
            last_nudge_at: Set(None),
            version: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(db_error)?;

        txn.commit().await.map_err(db_error)?;

        info!(
            expense_id = %expense.id,
            owner_id = %actor.user_id,
            status = %submission.status,
            approvals_needed = submission.approvals_needed,
            "expense submitted"
        );
        self.publish(&actor, expense.id, &submission.events, now);

        Ok(ExpenseDetails {
            expense,
            approvals: Vec::new(),
            withdrawal_approvals: Vec::new(),
            approvals_needed: submission.approvals_needed,
        })
    }

    /// Returns an expense with both ledgers.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the expense does not exist or belongs to another
    /// company.
    pub async fn get(
        &self,
        actor_id: Uuid,
        expense_id: Uuid,
    ) -> Result<ExpenseDetails, ExpenseError> {
        let actor = load_actor(&self.db, actor_id).await?;
        let expense = find_expense(&self.db, expense_id, false).await?;
        let target = expense_ref(&expense);
        AuthorizationGate::authorize(Some(&actor), &target, Action::View).into_result(&target)?;

        load_details(&self.db, expense).await
    }

    /// Lists the actor's company expenses, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` for an unknown actor.
    pub async fn list(
        &self,
        actor_id: Uuid,
        status: Option<ExpenseStatus>,
    ) -> Result<Vec<expenses::Model>, ExpenseError> {
        let actor = load_actor(&self.db, actor_id).await?;
        AuthorizationGate::authorize_company(Some(&actor), actor.company_id, Action::View)?;

        let mut query = expenses::Entity::find()
            .filter(expenses::Column::CompanyId.eq(actor.company_id));
        if let Some(status) = status {
            query = query.filter(expenses::Column::Status.eq(ExpenseStatusDb::from(status)));
        }

        query
            .order_by_desc(expenses::Column::CreatedAt)
            .order_by_desc(expenses::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_error)
    }

    /// Edits an expense's details. Owner only, while pending or approved.
    ///
    /// Existing approvals are kept.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` once a withdrawal was requested.
    pub async fn update(
        &self,
        actor_id: Uuid,
        expense_id: Uuid,
        patch: ExpensePatch,
    ) -> Result<ExpenseDetails, ExpenseError> {
        let patch = patch.validated()?;
        let now = self.clock.now();

        let txn = self.db.begin().await.map_err(db_error)?;
        let actor = load_actor(&txn, actor_id).await?;
        let expense = find_expense(&txn, expense_id, true).await?;
        ExpenseStateMachine::ensure_editable(
            Some(&actor),
            &expense_ref(&expense),
            expense.status.into(),
        )?;

        let mut update = versioned_update(&expense, now);
        if let Some(amount) = patch.amount {
            update = update.col_expr(expenses::Column::Amount, Expr::value(amount));
        }
        if let Some(category) = patch.category {
            update = update.col_expr(expenses::Column::Category, Expr::value(category));
        }
        if let Some(date) = patch.date {
            update = update.col_expr(expenses::Column::ExpenseDate, Expr::value(date));
        }
        if let Some(description) = patch.description {
            update = update.col_expr(expenses::Column::Description, Expr::value(description));
        }
        exec_versioned(update, &txn, expense_id).await?;

        let updated = find_expense(&txn, expense_id, false).await?;
        let details = load_details(&txn, updated).await?;
        txn.commit().await.map_err(db_error)?;

        info!(expense_id = %expense_id, actor_id = %actor_id, "expense updated");
        Ok(details)
    }

    /// Deletes an expense and its ledger rows. Owner only, while pending.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` once the expense left `PENDING_APPROVAL`.
    pub async fn delete(&self, actor_id: Uuid, expense_id: Uuid) -> Result<(), ExpenseError> {
        let txn = self.db.begin().await.map_err(db_error)?;
        let actor = load_actor(&txn, actor_id).await?;
        let expense = find_expense(&txn, expense_id, true).await?;
        ExpenseStateMachine::ensure_deletable(
            Some(&actor),
            &expense_ref(&expense),
            expense.status.into(),
        )?;

        let result = expenses::Entity::delete_many()
            .filter(expenses::Column::Id.eq(expense_id))
            .filter(expenses::Column::Version.eq(expense.version))
            .exec(&txn)
            .await
            .map_err(db_error)?;
        if result.rows_affected == 0 {
            return Err(ExpenseError::ConcurrencyConflict(expense_id));
        }

        txn.commit().await.map_err(db_error)?;

        info!(expense_id = %expense_id, actor_id = %actor_id, "expense deleted");
        Ok(())
    }

    /// Founder approves a pending expense.
    ///
    /// # Errors
    ///
    /// See [`ExpenseRepository::transition`].
    pub async fn approve(
        &self,
        actor_id: Uuid,
        expense_id: Uuid,
    ) -> Result<ExpenseDetails, ExpenseError> {
        self.transition(actor_id, expense_id, Command::Approve).await
    }

    /// Founder rejects a pending expense with a reason.
    ///
    /// # Errors
    ///
    /// See [`ExpenseRepository::transition`].
    pub async fn reject(
        &self,
        actor_id: Uuid,
        expense_id: Uuid,
        reason: String,
    ) -> Result<ExpenseDetails, ExpenseError> {
        self.transition(actor_id, expense_id, Command::Reject { reason }).await
    }

    /// Owner requests the funds of an approved expense.
    ///
    /// # Errors
    ///
    /// See [`ExpenseRepository::transition`].
    pub async fn request_withdrawal(
        &self,
        actor_id: Uuid,
        expense_id: Uuid,
    ) -> Result<ExpenseDetails, ExpenseError> {
        self.transition(actor_id, expense_id, Command::RequestWithdrawal).await
    }

    /// Founder countersigns a withdrawal.
    ///
    /// # Errors
    ///
    /// See [`ExpenseRepository::transition`].
    pub async fn approve_withdrawal(
        &self,
        actor_id: Uuid,
        expense_id: Uuid,
    ) -> Result<ExpenseDetails, ExpenseError> {
        self.transition(actor_id, expense_id, Command::ApproveWithdrawal).await
    }

    /// Founder rejects a withdrawal with a reason.
    ///
    /// # Errors
    ///
    /// See [`ExpenseRepository::transition`].
    pub async fn reject_withdrawal(
        &self,
        actor_id: Uuid,
        expense_id: Uuid,
        reason: String,
    ) -> Result<ExpenseDetails, ExpenseError> {
        self.transition(actor_id, expense_id, Command::RejectWithdrawal { reason }).await
    }

    /// Owner confirms the funds arrived.
    ///
    /// # Errors
    ///
    /// See [`ExpenseRepository::transition`].
    pub async fn confirm_receipt(
        &self,
        actor_id: Uuid,
        expense_id: Uuid,
    ) -> Result<ExpenseDetails, ExpenseError> {
        self.transition(actor_id, expense_id, Command::ConfirmReceipt).await
    }

    /// Applies a lifecycle command atomically.
    ///
    /// # Errors
    ///
    /// Returns the state machine's error for an illegal command,
    /// `DuplicateDecision` when the ledger already holds the actor's approval,
    /// `ConcurrencyConflict` when another writer changed the expense first,
    /// and `Database` when the store fails.
    pub async fn transition(
        &self,
        actor_id: Uuid,
        expense_id: Uuid,
        command: Command,
    ) -> Result<ExpenseDetails, ExpenseError> {
        let now = self.clock.now();

        let txn = self.db.begin().await.map_err(db_error)?;
        let actor = load_actor(&txn, actor_id).await?;
        let expense = find_expense(&txn, expense_id, true).await?;
        let roster = load_roster(&txn, expense.company_id).await?;
        let (approval_ledger, withdrawal_ledger) = load_ledgers(&txn, expense_id).await?;

        let ctx = DecisionContext {
            actor: Some(&actor),
            expense: expense_ref(&expense),
            status: expense.status.into(),
            roster: &roster,
            approvals: &approval_ledger,
            withdrawal_approvals: &withdrawal_ledger,
            now,
        };
        let transition = ExpenseStateMachine::apply(&ctx, &command)?;

        if let Some((phase, ledger_entry)) = transition.ledger_entry {
            insert_ledger_row(&txn, expense_id, phase, ledger_entry).await?;
        }

        let mut update = versioned_update(&expense, now).col_expr(
            expenses::Column::Status,
            Expr::value(ExpenseStatusDb::from(transition.to)),
        );
        if let Some(rejection) = &transition.rejection {
            update = update
                .col_expr(expenses::Column::RejectedBy, Expr::value(rejection.rejected_by))
                .col_expr(
                    expenses::Column::RejectedAt,
                    Expr::value(to_db_time(rejection.rejected_at)),
                )
                .col_expr(
                    expenses::Column::RejectionReason,
                    Expr::value(rejection.reason.clone()),
                );
        }
        exec_versioned(update, &txn, expense_id).await?;

        let updated = find_expense(&txn, expense_id, false).await?;
        let details = load_details(&txn, updated).await?;
        txn.commit().await.map_err(db_error)?;

        info!(
            expense_id = %expense_id,
            actor_id = %actor_id,
            action = %command.action(),
            from = %transition.from,
            to = %transition.to,
            approvals_needed = transition.approvals_needed,
            "expense transition committed"
        );
        self.publish(&actor, expense_id, &transition.events, now);

        Ok(details)
    }

    /// Reminds founders who have not decided on a pending expense yet.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` with the retry-after instant while the company's
    /// cooldown runs.
    pub async fn nudge(
        &self,
        actor_id: Uuid,
        expense_id: Uuid,
    ) -> Result<NudgeReport, ExpenseError> {
        let now = self.clock.now();

        let txn = self.db.begin().await.map_err(db_error)?;
        let actor = load_actor(&txn, actor_id).await?;
        let expense = find_expense(&txn, expense_id, true).await?;
        let target = expense_ref(&expense);
        AuthorizationGate::authorize(Some(&actor), &target, Action::Nudge).into_result(&target)?;

        let company = find_company(&txn, expense.company_id).await?;
        let roster = load_roster(&txn, expense.company_id).await?;
        let approvals = load_approvals(&txn, expense_id).await?;
        let ledger = ApprovalLedger::from_entries(
            Phase::Approval,
            approvals.iter().map(|a| entry(a.approver_id, a.created_at)),
        );

        let outcome = NudgePolicy::evaluate(&NudgeRequest {
            actor: Some(&actor),
            expense: target,
            status: expense.status.into(),
            last_nudge_at: expense.last_nudge_at.map(|t| t.with_timezone(&Utc)),
            cooldown: NudgePolicy::cooldown(cooldown_hours(&company), self.default_cooldown_hours),
            roster: &roster,
            approvals: &ledger,
            now,
        })?;

        let update = versioned_update(&expense, now).col_expr(
            expenses::Column::LastNudgeAt,
            Expr::value(to_db_time(outcome.nudged_at)),
        );
        exec_versioned(update, &txn, expense_id).await?;

        txn.commit().await.map_err(db_error)?;

        info!(
            expense_id = %expense_id,
            pending = outcome.pending_founders.len(),
            "founders nudged"
        );
        self.publish(&actor, expense_id, &[EventKind::Nudged], now);

        Ok(NudgeReport {
            expense_id,
            nudged_at: outcome.nudged_at,
            pending_founders: outcome.pending_founders,
        })
    }

    fn publish(&self, actor: &Actor, expense_id: Uuid, kinds: &[EventKind], at: DateTime<Utc>) {
        self.bus.publish_all(kinds.iter().map(|kind| ExpenseEvent {
            kind: *kind,
            expense_id,
            company_id: actor.company_id,
            actor_id: actor.user_id,
            occurred_at: at,
        }));
    }
}

/// Advances every open expense of `company_id` whose current phase the live
/// `roster` now completes. Runs inside the caller's transaction; the caller
/// publishes the returned events after commit.
pub(crate) async fn settle_open_expenses(
    txn: &DatabaseTransaction,
    company_id: Uuid,
    roster: &[RosterEntry],
    now: DateTime<Utc>,
) -> Result<Vec<(Uuid, EventKind)>, ExpenseError> {
    let open = expenses::Entity::find()
        .filter(expenses::Column::CompanyId.eq(company_id))
        .filter(expenses::Column::Status.is_in([
            ExpenseStatusDb::PendingApproval,
            ExpenseStatusDb::WithdrawalRequested,
        ]))
        .order_by_asc(expenses::Column::CreatedAt)
        .order_by_asc(expenses::Column::Id)
        .lock_exclusive()
        .all(txn)
        .await
        .map_err(db_error)?;

    let mut settled = Vec::new();
    for expense in open {
        let (approvals, withdrawal_approvals) = load_ledgers(txn, expense.id).await?;
        let from: ExpenseStatus = expense.status.into();
        let Some((to, event)) = ExpenseStateMachine::settle(
            from,
            expense.owner_id,
            roster,
            &approvals,
            &withdrawal_approvals,
        ) else {
            continue;
        };

        let update = versioned_update(&expense, now)
            .col_expr(expenses::Column::Status, Expr::value(ExpenseStatusDb::from(to)));
        exec_versioned(update, txn, expense.id).await?;

        info!(
            expense_id = %expense.id,
            from = %from,
            to = %to,
            "quorum completed by roster change"
        );
        settled.push((expense.id, event));
    }
    Ok(settled)
}

fn expense_ref(expense: &expenses::Model) -> ExpenseRef {
    ExpenseRef {
        expense_id: expense.id,
        company_id: expense.company_id,
        owner_id: expense.owner_id,
    }
}

fn entry(approver_id: Uuid, created_at: sea_orm::prelude::DateTimeWithTimeZone) -> LedgerEntry {
    LedgerEntry {
        approver_id,
        approved_at: created_at.with_timezone(&Utc),
    }
}

fn to_db_time(at: DateTime<Utc>) -> sea_orm::prelude::DateTimeWithTimeZone {
    at.into()
}

async fn find_company<C: ConnectionTrait>(
    conn: &C,
    company_id: Uuid,
) -> Result<companies::Model, ExpenseError> {
    companies::Entity::find_by_id(company_id)
        .one(conn)
        .await
        .map_err(db_error)?
        .ok_or(ExpenseError::NotFound {
            entity: "Company",
            id: company_id,
        })
}

async fn find_expense<C: ConnectionTrait>(
    conn: &C,
    expense_id: Uuid,
    for_update: bool,
) -> Result<expenses::Model, ExpenseError> {
    let mut query = expenses::Entity::find_by_id(expense_id);
    if for_update {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ExpenseError::expense_not_found(expense_id))
}

async fn load_approvals<C: ConnectionTrait>(
    conn: &C,
    expense_id: Uuid,
) -> Result<Vec<approvals::Model>, ExpenseError> {
    approvals::Entity::find()
        .filter(approvals::Column::ExpenseId.eq(expense_id))
        .order_by_asc(approvals::Column::CreatedAt)
        .order_by_asc(approvals::Column::Id)
        .all(conn)
        .await
        .map_err(db_error)
}

async fn load_withdrawal_approvals<C: ConnectionTrait>(
    conn: &C,
    expense_id: Uuid,
) -> Result<Vec<withdrawal_approvals::Model>, ExpenseError> {
    withdrawal_approvals::Entity::find()
        .filter(withdrawal_approvals::Column::ExpenseId.eq(expense_id))
        .order_by_asc(withdrawal_approvals::Column::CreatedAt)
        .order_by_asc(withdrawal_approvals::Column::Id)
        .all(conn)
        .await
        .map_err(db_error)
}

async fn load_ledgers<C: ConnectionTrait>(
    conn: &C,
    expense_id: Uuid,
) -> Result<(ApprovalLedger, ApprovalLedger), ExpenseError> {
    let approvals = load_approvals(conn, expense_id).await?;
    let withdrawal_approvals = load_withdrawal_approvals(conn, expense_id).await?;

    Ok((
        ApprovalLedger::from_entries(
            Phase::Approval,
            approvals.iter().map(|a| entry(a.approver_id, a.created_at)),
        ),
        ApprovalLedger::from_entries(
            Phase::Withdrawal,
            withdrawal_approvals
                .iter()
                .map(|a| entry(a.approver_id, a.created_at)),
        ),
    ))
}

async fn load_details<C: ConnectionTrait>(
    conn: &C,
    expense: expenses::Model,
) -> Result<ExpenseDetails, ExpenseError> {
    let approvals = load_approvals(conn, expense.id).await?;
    let withdrawal_approvals = load_withdrawal_approvals(conn, expense.id).await?;
    let roster = load_roster(conn, expense.company_id).await?;
    let approvals_needed =
        ExpenseStateMachine::approvals_needed_now(expense.status.into(), expense.owner_id, &roster);

    Ok(ExpenseDetails {
        expense,
        approvals,
        withdrawal_approvals,
        approvals_needed,
    })
}

async fn insert_ledger_row(
    txn: &DatabaseTransaction,
    expense_id: Uuid,
    phase: Phase,
    ledger_entry: LedgerEntry,
) -> Result<(), ExpenseError> {
    let created_at = to_db_time(ledger_entry.approved_at);
    let result = match phase {
        Phase::Approval => {
            approvals::Entity::insert(approvals::ActiveModel {
                id: Set(Uuid::now_v7()),
                expense_id: Set(expense_id),
                approver_id: Set(ledger_entry.approver_id),
                created_at: Set(created_at),
            })
            .exec_without_returning(txn)
            .await
        }
        Phase::Withdrawal => {
            withdrawal_approvals::Entity::insert(withdrawal_approvals::ActiveModel {
                id: Set(Uuid::now_v7()),
                expense_id: Set(expense_id),
                approver_id: Set(ledger_entry.approver_id),
                created_at: Set(created_at),
            })
            .exec_without_returning(txn)
            .await
        }
    };

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => {
            debug!(
                %expense_id,
                approver_id = %ledger_entry.approver_id,
                "duplicate ledger row refused"
            );
            Err(ExpenseError::DuplicateDecision {
                approver_id: ledger_entry.approver_id,
                phase,
            })
        }
        Err(e) => Err(db_error(e)),
    }
}

/// Starts an update that bumps `version` and only matches the version read.
fn versioned_update(expense: &expenses::Model, now: DateTime<Utc>) -> UpdateMany<expenses::Entity> {
    expenses::Entity::update_many()
        .col_expr(expenses::Column::Version, Expr::value(expense.version + 1))
        .col_expr(expenses::Column::UpdatedAt, Expr::value(to_db_time(now)))
        .filter(expenses::Column::Id.eq(expense.id))
        .filter(expenses::Column::Version.eq(expense.version))
}

async fn exec_versioned(
    update: UpdateMany<expenses::Entity>,
    txn: &DatabaseTransaction,
    expense_id: Uuid,
) -> Result<(), ExpenseError> {
    let result = update.exec(txn).await.map_err(db_error)?;
    if result.rows_affected == 0 {
        return Err(ExpenseError::ConcurrencyConflict(expense_id));
    }
    Ok(())
}
