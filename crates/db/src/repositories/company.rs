//! Company repository: signup, settings and roster.

use chrono::Utc;
use cofound_core::expense::validation::{validate_company_name, validate_cooldown_hours};
use cofound_core::expense::{Action, AuthorizationGate, ExpenseError};
use cofound_shared::CurrencyCode;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::entities::{companies, sea_orm_active_enums::UserRole, users};

use super::{
    db_error, is_unique_violation, load_actor, load_members, normalize_email,
    validate_person_name,
};

/// Input for creating a company with its first founder.
#[derive(Debug, Clone)]
pub struct NewCompany {
    /// Company name.
    pub name: String,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Nudge cooldown override, in hours.
    pub nudge_cooldown_hours: Option<u32>,
    /// Founder's display name.
    pub founder_name: String,
    /// Founder's email.
    pub founder_email: String,
}

/// Partial update of company settings.
#[derive(Debug, Clone, Default)]
pub struct CompanySettings {
    /// New name.
    pub name: Option<String>,
    /// New ISO-4217 currency code.
    pub currency: Option<String>,
    /// New nudge cooldown, in hours.
    pub nudge_cooldown_hours: Option<u32>,
}

/// A company with its members.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyWithMembers {
    /// The company.
    pub company: companies::Model,
    /// Every member, oldest first.
    pub members: Vec<users::Model>,
}

/// Company repository.
#[derive(Debug, Clone)]
pub struct CompanyRepository {
    db: DatabaseConnection,
}

impl CompanyRepository {
    /// Creates a new company repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a company and its first founder in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed payload or an email that is
    /// already registered, `Database` if the store fails.
    pub async fn signup(
        &self,
        input: NewCompany,
    ) -> Result<(companies::Model, users::Model), ExpenseError> {
        let name = validate_company_name(&input.name)?;
        let currency = parse_currency(&input.currency)?;
        let cooldown = input
            .nudge_cooldown_hours
            .map(validate_cooldown_hours)
            .transpose()?;
        let founder_name = validate_person_name(&input.founder_name)?;
        let founder_email = normalize_email(&input.founder_email)?;

        let now = Utc::now().into();
        let company_id = Uuid::now_v7();
        let founder_id = Uuid::now_v7();

        let txn = self.db.begin().await.map_err(db_error)?;

        let company = companies::ActiveModel {
            id: Set(company_id),
            name: Set(name),
            currency: Set(currency),
            nudge_cooldown_hours: Set(cooldown.map(hours_to_db)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(db_error)?;

        let founder = users::ActiveModel {
            id: Set(founder_id),
            company_id: Set(company_id),
            name: Set(founder_name),
            email: Set(founder_email),
            role: Set(UserRole::Founder),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| email_taken_or(e, &input.founder_email))?;

        txn.commit().await.map_err(db_error)?;

        info!(company_id = %company.id, founder_id = %founder.id, "company created");
        Ok((company, founder))
    }

    /// Finds a company by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<companies::Model>, ExpenseError> {
        companies::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_error)
    }

    /// Returns the actor's company with its members.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` for an unknown actor.
    pub async fn for_actor(&self, actor_id: Uuid) -> Result<CompanyWithMembers, ExpenseError> {
        let actor = load_actor(&self.db, actor_id).await?;
        AuthorizationGate::authorize_company(Some(&actor), actor.company_id, Action::View)?;

        let company = self
            .find_by_id(actor.company_id)
            .await?
            .ok_or(ExpenseError::NotFound {
                entity: "Company",
                id: actor.company_id,
            })?;
        let members = load_members(&self.db, actor.company_id).await?;

        Ok(CompanyWithMembers { company, members })
    }

    /// Updates company settings. Founders only.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for a member, `Validation` for a malformed payload.
    pub async fn update_settings(
        &self,
        actor_id: Uuid,
        settings: CompanySettings,
    ) -> Result<companies::Model, ExpenseError> {
        let name = settings
            .name
            .as_deref()
            .map(validate_company_name)
            .transpose()?;
        let currency = settings
            .currency
            .as_deref()
            .map(parse_currency)
            .transpose()?;
        let cooldown = settings
            .nudge_cooldown_hours
            .map(validate_cooldown_hours)
            .transpose()?;

        let txn = self.db.begin().await.map_err(db_error)?;
        let actor = load_actor(&txn, actor_id).await?;
        AuthorizationGate::authorize_company(
            Some(&actor),
            actor.company_id,
            Action::ManageCompany,
        )?;

        let company = companies::Entity::find_by_id(actor.company_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error)?
            .ok_or(ExpenseError::NotFound {
                entity: "Company",
                id: actor.company_id,
            })?;

        let mut active: companies::ActiveModel = company.into();
        if let Some(name) = name {
            active.name = Set(name);
        }
        if let Some(currency) = currency {
            active.currency = Set(currency);
        }
        if let Some(hours) = cooldown {
            active.nudge_cooldown_hours = Set(Some(hours_to_db(hours)));
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(&txn).await.map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        info!(company_id = %updated.id, actor_id = %actor_id, "company settings updated");
        Ok(updated)
    }
}

/// Nudge cooldown stored on a company, in hours.
#[must_use]
pub fn cooldown_hours(company: &companies::Model) -> Option<u32> {
    company
        .nudge_cooldown_hours
        .and_then(|h| u32::try_from(h).ok())
}

fn hours_to_db(hours: u32) -> i32 {
    // Validated to 1..=720 before reaching here.
    i32::try_from(hours).unwrap_or(i32::MAX)
}

fn parse_currency(raw: &str) -> Result<String, ExpenseError> {
    raw.parse::<CurrencyCode>()
        .map(|c| c.as_str().to_string())
        .map_err(ExpenseError::Validation)
}

pub(crate) fn email_taken_or(e: sea_orm::DbErr, email: &str) -> ExpenseError {
    if is_unique_violation(&e) {
        ExpenseError::Validation(format!("email '{}' is already registered", email.trim()))
    } else {
        db_error(e)
    }
}
