//! Company signup, settings and membership routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use cofound_core::expense::Role;
use cofound_db::entities::{companies, users};
use cofound_db::repositories::{CompanySettings, NewCompany, NewMember};
use cofound_shared::AppError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{app_error_response, bad_request, error_response};
use crate::{AppState, middleware::AuthUser};

/// Routes reachable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/companies", post(signup))
}

/// Routes that require the auth middleware.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/companies/me", get(get_company).patch(update_company))
        .route("/companies/me/members", post(add_member))
        .route("/companies/me/members/{user_id}/role", patch(change_role))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for signing up a company.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    /// Company name.
    pub name: String,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Nudge cooldown in hours.
    pub nudge_cooldown_hours: Option<u32>,
    /// Founder's display name.
    pub founder_name: String,
    /// Founder's email.
    pub founder_email: String,
}

/// Request body for updating company settings.
#[derive(Debug, Deserialize)]
pub struct UpdateCompanyRequest {
    /// New name.
    pub name: Option<String>,
    /// New currency code.
    pub currency: Option<String>,
    /// New nudge cooldown in hours.
    pub nudge_cooldown_hours: Option<u32>,
}

/// Request body for adding a member.
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    /// Display name.
    pub name: String,
    /// Email.
    pub email: String,
    /// FOUNDER or MEMBER.
    pub role: String,
}

/// Request body for changing a role.
#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    /// FOUNDER or MEMBER.
    pub role: String,
}

/// Company as returned by the API.
#[derive(Debug, Serialize)]
pub struct CompanyResponse {
    /// Company ID.
    pub id: Uuid,
    /// Name.
    pub name: String,
    /// Currency code.
    pub currency: String,
    /// Nudge cooldown override in hours.
    pub nudge_cooldown_hours: Option<i32>,
    /// Created at timestamp.
    pub created_at: String,
}

impl From<companies::Model> for CompanyResponse {
    fn from(c: companies::Model) -> Self {
        Self {
            id: c.id,
            name: c.name,
            currency: c.currency,
            nudge_cooldown_hours: c.nudge_cooldown_hours,
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

/// Member as returned by the API.
#[derive(Debug, Serialize)]
pub struct MemberResponse {
    /// User ID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Email.
    pub email: String,
    /// Role.
    pub role: Role,
}

impl From<users::Model> for MemberResponse {
    fn from(u: users::Model) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role.into(),
        }
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/companies` - Create a company and its first founder.
///
/// Returns an access token for the founder.
async fn signup(State(state): State<AppState>, Json(payload): Json<SignupRequest>) -> Response {
    let input = NewCompany {
        name: payload.name,
        currency: payload.currency,
        nudge_cooldown_hours: payload.nudge_cooldown_hours,
        founder_name: payload.founder_name,
        founder_email: payload.founder_email,
    };

    let (company, founder) = match state.companies().signup(input).await {
        Ok(created) => created,
        Err(e) => return error_response(&e),
    };

    let Some(token) = issue_token(&state, &founder) else {
        return token_failure();
    };

    info!(company_id = %company.id, "company signed up");
    (
        StatusCode::CREATED,
        Json(json!({
            "company": CompanyResponse::from(company),
            "founder": MemberResponse::from(founder),
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": state.jwt_service.access_token_expires_in(),
        })),
    )
        .into_response()
}

/// GET `/companies/me` - The caller's company with its members.
async fn get_company(State(state): State<AppState>, auth: AuthUser) -> Response {
    match state.companies().for_actor(auth.user_id()).await {
        Ok(view) => {
            let members: Vec<MemberResponse> =
                view.members.into_iter().map(MemberResponse::from).collect();
            (
                StatusCode::OK,
                Json(json!({
                    "company": CompanyResponse::from(view.company),
                    "members": members,
                })),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// PATCH `/companies/me` - Update company settings. Founders only.
async fn update_company(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateCompanyRequest>,
) -> Response {
    let settings = CompanySettings {
        name: payload.name,
        currency: payload.currency,
        nudge_cooldown_hours: payload.nudge_cooldown_hours,
    };

    match state
        .companies()
        .update_settings(auth.user_id(), settings)
        .await
    {
        Ok(company) => (StatusCode::OK, Json(CompanyResponse::from(company))).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST `/companies/me/members` - Add a member. Founders only.
///
/// Returns an access token for the new member.
async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AddMemberRequest>,
) -> Response {
    let Some(role) = Role::parse(&payload.role) else {
        return bad_request("role must be FOUNDER or MEMBER");
    };

    let input = NewMember {
        name: payload.name,
        email: payload.email,
        role,
    };

    let user = match state.users().add_member(auth.user_id(), input).await {
        Ok(user) => user,
        Err(e) => return error_response(&e),
    };

    let Some(token) = issue_token(&state, &user) else {
        return token_failure();
    };

    (
        StatusCode::CREATED,
        Json(json!({
            "member": MemberResponse::from(user),
            "access_token": token,
            "token_type": "Bearer",
        })),
    )
        .into_response()
}

/// PATCH `/companies/me/members/{user_id}/role` - Change a member's role.
async fn change_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ChangeRoleRequest>,
) -> Response {
    let Some(role) = Role::parse(&payload.role) else {
        return bad_request("role must be FOUNDER or MEMBER");
    };

    match state
        .users()
        .change_role(auth.user_id(), user_id, role)
        .await
    {
        Ok(user) => (StatusCode::OK, Json(MemberResponse::from(user))).into_response(),
        Err(e) => error_response(&e),
    }
}

fn issue_token(state: &AppState, user: &users::Model) -> Option<String> {
    let role = Role::from(user.role);
    match state
        .jwt_service
        .generate_access_token(user.id, user.company_id, role.as_str())
    {
        Ok(token) => Some(token),
        Err(e) => {
            error!(error = %e, user_id = %user.id, "Failed to issue access token");
            None
        }
    }
}

fn token_failure() -> Response {
    app_error_response(&AppError::Internal(
        "Failed to issue access token".to_string(),
    ))
}
