//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod company;
pub mod expense;
pub mod user;

pub use company::{CompanyRepository, CompanySettings, CompanyWithMembers, NewCompany};
pub use expense::{ExpenseDetails, ExpenseRepository, NudgeReport};
pub use user::{NewMember, UserRepository};

use cofound_core::expense::{Actor, ExpenseError, RosterEntry};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::entities::users;

pub(crate) fn db_error(e: DbErr) -> ExpenseError {
    ExpenseError::Database(e.to_string())
}

/// Resolves the acting user from the live `users` row.
///
/// An unknown user id is treated as an unauthenticated caller.
pub(crate) async fn load_actor<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Actor, ExpenseError> {
    let user = users::Entity::find_by_id(user_id)
        .one(conn)
        .await
        .map_err(db_error)?
        .ok_or(ExpenseError::Unauthenticated)?;

    Ok(Actor {
        user_id: user.id,
        company_id: user.company_id,
        role: user.role.into(),
    })
}

/// Loads the current roster of a company.
pub(crate) async fn load_roster<C: ConnectionTrait>(
    conn: &C,
    company_id: Uuid,
) -> Result<Vec<RosterEntry>, ExpenseError> {
    let members = load_members(conn, company_id).await?;
    Ok(members
        .into_iter()
        .map(|u| RosterEntry {
            user_id: u.id,
            role: u.role.into(),
        })
        .collect())
}

pub(crate) async fn load_members<C: ConnectionTrait>(
    conn: &C,
    company_id: Uuid,
) -> Result<Vec<users::Model>, ExpenseError> {
    users::Entity::find()
        .filter(users::Column::CompanyId.eq(company_id))
        .order_by_asc(users::Column::CreatedAt)
        .order_by_asc(users::Column::Id)
        .all(conn)
        .await
        .map_err(db_error)
}

pub(crate) fn normalize_email(raw: &str) -> Result<String, ExpenseError> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid || email.len() > 255 {
        return Err(ExpenseError::Validation(format!(
            "'{}' is not a valid email address",
            raw.trim()
        )));
    }
    Ok(email)
}

pub(crate) fn validate_person_name(raw: &str) -> Result<String, ExpenseError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > 100 {
        return Err(ExpenseError::Validation(
            "name must be 1 to 100 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

pub(crate) fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(sea_orm::SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Ada@Example.COM ").unwrap(),
            "ada@example.com"
        );
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("@example.com").is_err());
    }

    #[test]
    fn test_person_name() {
        assert_eq!(validate_person_name(" Ada ").unwrap(), "Ada");
        assert!(validate_person_name("  ").is_err());
    }
}
