//! Expense lifecycle routes.
//!
//! Handlers translate HTTP into `ExpenseRepository` calls. Every decision,
//! including who may do what, is made below this layer.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use cofound_core::expense::{ExpenseDraft, ExpensePatch, ExpenseStatus};
use cofound_db::entities::expenses;
use cofound_db::repositories::{ExpenseDetails, NudgeReport};
use cofound_shared::MINOR_UNIT_SCALE;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{bad_request, error_response};
use crate::{AppState, middleware::AuthUser};

/// Creates the expense routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/expenses", get(list_expenses).post(create_expense))
        .route(
            "/expenses/{id}",
            get(get_expense).patch(update_expense).delete(delete_expense),
        )
        .route("/expenses/{id}/approve", post(approve))
        .route("/expenses/{id}/reject", post(reject))
        .route("/expenses/{id}/withdrawal", post(request_withdrawal))
        .route("/expenses/{id}/withdrawal/approve", post(approve_withdrawal))
        .route("/expenses/{id}/withdrawal/reject", post(reject_withdrawal))
        .route("/expenses/{id}/receipt", post(confirm_receipt))
        .route("/expenses/{id}/nudge", post(nudge))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing expenses.
#[derive(Debug, Deserialize)]
pub struct ListExpensesQuery {
    /// Filter by status, e.g. `PENDING_APPROVAL`.
    pub status: Option<String>,
}

/// Request body for submitting an expense.
#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    /// Amount as a decimal string.
    pub amount: String,
    /// Category.
    pub category: String,
    /// Date the expense was incurred (YYYY-MM-DD).
    pub date: NaiveDate,
    /// Optional description.
    pub description: Option<String>,
}

/// Request body for editing an expense.
#[derive(Debug, Deserialize)]
pub struct UpdateExpenseRequest {
    /// New amount as a decimal string.
    pub amount: Option<String>,
    /// New category.
    pub category: Option<String>,
    /// New date.
    pub date: Option<NaiveDate>,
    /// New description; an empty string clears it.
    pub description: Option<String>,
}

/// Request body carrying a rejection reason.
#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    /// Why the expense or withdrawal is refused.
    pub reason: String,
}

/// One ledger row.
#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    /// Founder who approved.
    pub approver_id: Uuid,
    /// When.
    pub approved_at: String,
}

/// Expense with both ledgers.
#[derive(Debug, Serialize)]
pub struct ExpenseResponse {
    /// Expense ID.
    pub id: Uuid,
    /// Submitting user.
    pub owner_id: Uuid,
    /// Amount.
    pub amount: String,
    /// Currency code.
    pub currency: String,
    /// Category.
    pub category: String,
    /// Date incurred.
    pub date: String,
    /// Description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: ExpenseStatus,
    /// Founder who rejected, if rejected.
    pub rejected_by: Option<Uuid>,
    /// When it was rejected.
    pub rejected_at: Option<String>,
    /// Why it was rejected.
    pub rejection_reason: Option<String>,
    /// Last nudge.
    pub last_nudge_at: Option<String>,
    /// Approval-phase ledger.
    pub approvals: Vec<ApprovalResponse>,
    /// Withdrawal-phase ledger.
    pub withdrawal_approvals: Vec<ApprovalResponse>,
    /// Approvals the current phase needs.
    pub approvals_needed: usize,
    /// Created at timestamp.
    pub created_at: String,
    /// Updated at timestamp.
    pub updated_at: String,
}

impl From<ExpenseDetails> for ExpenseResponse {
    fn from(details: ExpenseDetails) -> Self {
        let e = details.expense;
        Self {
            id: e.id,
            owner_id: e.owner_id,
            amount: e.amount.round_dp(MINOR_UNIT_SCALE).to_string(),
            currency: e.currency,
            category: e.category,
            date: e.expense_date.to_string(),
            description: e.description,
            status: e.status.into(),
            rejected_by: e.rejected_by,
            rejected_at: e.rejected_at.map(|t| t.to_rfc3339()),
            rejection_reason: e.rejection_reason,
            last_nudge_at: e.last_nudge_at.map(|t| t.to_rfc3339()),
            approvals: details
                .approvals
                .into_iter()
                .map(|a| ApprovalResponse {
                    approver_id: a.approver_id,
                    approved_at: a.created_at.to_rfc3339(),
                })
                .collect(),
            withdrawal_approvals: details
                .withdrawal_approvals
                .into_iter()
                .map(|a| ApprovalResponse {
                    approver_id: a.approver_id,
                    approved_at: a.created_at.to_rfc3339(),
                })
                .collect(),
            approvals_needed: details.approvals_needed,
            created_at: e.created_at.to_rfc3339(),
            updated_at: e.updated_at.to_rfc3339(),
        }
    }
}

/// Expense list item (without ledgers).
#[derive(Debug, Serialize)]
pub struct ExpenseListItem {
    /// Expense ID.
    pub id: Uuid,
    /// Submitting user.
    pub owner_id: Uuid,
    /// Amount.
    pub amount: String,
    /// Currency code.
    pub currency: String,
    /// Category.
    pub category: String,
    /// Date incurred.
    pub date: String,
    /// Lifecycle status.
    pub status: ExpenseStatus,
    /// Created at timestamp.
    pub created_at: String,
}

impl From<expenses::Model> for ExpenseListItem {
    fn from(e: expenses::Model) -> Self {
        Self {
            id: e.id,
            owner_id: e.owner_id,
            amount: e.amount.round_dp(MINOR_UNIT_SCALE).to_string(),
            currency: e.currency,
            category: e.category,
            date: e.expense_date.to_string(),
            status: e.status.into(),
            created_at: e.created_at.to_rfc3339(),
        }
    }
}

/// Nudge result.
#[derive(Debug, Serialize)]
pub struct NudgeResponse {
    /// Expense ID.
    pub expense_id: Uuid,
    /// When the nudge was recorded.
    pub nudged_at: String,
    /// Founders who still owe a decision.
    pub pending_founders: Vec<Uuid>,
}

impl From<NudgeReport> for NudgeResponse {
    fn from(r: NudgeReport) -> Self {
        Self {
            expense_id: r.expense_id,
            nudged_at: r.nudged_at.to_rfc3339(),
            pending_founders: r.pending_founders,
        }
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET `/expenses` - List the caller's company expenses, newest first.
async fn list_expenses(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListExpensesQuery>,
) -> Response {
    let status = match query.status.as_deref().map(ExpenseStatus::parse) {
        None => None,
        Some(Some(status)) => Some(status),
        Some(None) => return bad_request("unknown expense status"),
    };

    match state.expenses().list(auth.user_id(), status).await {
        Ok(rows) => {
            let items: Vec<ExpenseListItem> = rows.into_iter().map(ExpenseListItem::from).collect();
            (StatusCode::OK, Json(json!({ "expenses": items }))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// POST `/expenses` - Submit an expense.
async fn create_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateExpenseRequest>,
) -> Response {
    let Ok(amount) = Decimal::from_str(payload.amount.trim()) else {
        return bad_request("Invalid amount format");
    };

    let draft = ExpenseDraft {
        amount,
        category: payload.category,
        date: payload.date,
        description: payload.description,
    };

    match state.expenses().submit(auth.user_id(), draft).await {
        Ok(details) => (StatusCode::CREATED, Json(ExpenseResponse::from(details))).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET `/expenses/{id}` - Expense with both ledgers.
async fn get_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    details_response(state.expenses().get(auth.user_id(), id).await)
}

/// PATCH `/expenses/{id}` - Edit an expense. Owner only.
async fn update_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateExpenseRequest>,
) -> Response {
    let amount = match payload.amount.as_deref().map(|a| Decimal::from_str(a.trim())) {
        None => None,
        Some(Ok(amount)) => Some(amount),
        Some(Err(_)) => return bad_request("Invalid amount format"),
    };

    let patch = ExpensePatch {
        amount,
        category: payload.category,
        date: payload.date,
        description: payload.description,
    };

    details_response(state.expenses().update(auth.user_id(), id, patch).await)
}

/// DELETE `/expenses/{id}` - Delete a pending expense. Owner only.
async fn delete_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    match state.expenses().delete(auth.user_id(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST `/expenses/{id}/approve`
async fn approve(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Response {
    details_response(state.expenses().approve(auth.user_id(), id).await)
}

/// POST `/expenses/{id}/reject`
async fn reject(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonRequest>,
) -> Response {
    details_response(
        state
            .expenses()
            .reject(auth.user_id(), id, payload.reason)
            .await,
    )
}

/// POST `/expenses/{id}/withdrawal`
async fn request_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    details_response(state.expenses().request_withdrawal(auth.user_id(), id).await)
}

/// POST `/expenses/{id}/withdrawal/approve`
async fn approve_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    details_response(state.expenses().approve_withdrawal(auth.user_id(), id).await)
}

/// POST `/expenses/{id}/withdrawal/reject`
async fn reject_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonRequest>,
) -> Response {
    details_response(
        state
            .expenses()
            .reject_withdrawal(auth.user_id(), id, payload.reason)
            .await,
    )
}

/// POST `/expenses/{id}/receipt`
async fn confirm_receipt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    details_response(state.expenses().confirm_receipt(auth.user_id(), id).await)
}

/// POST `/expenses/{id}/nudge`
async fn nudge(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Response {
    match state.expenses().nudge(auth.user_id(), id).await {
        Ok(report) => (StatusCode::OK, Json(NudgeResponse::from(report))).into_response(),
        Err(e) => error_response(&e),
    }
}

fn details_response(
    result: Result<ExpenseDetails, cofound_core::expense::ExpenseError>,
) -> Response {
    match result {
        Ok(details) => (StatusCode::OK, Json(ExpenseResponse::from(details))).into_response(),
        Err(e) => error_response(&e),
    }
}
