//! User repository: membership and role changes.

use std::fmt;
use std::sync::Arc;

use cofound_core::clock::Clock;
use cofound_core::events::{EventBus, ExpenseEvent};
use cofound_core::expense::{Action, AuthorizationGate, ExpenseError, QuorumPolicy, Role};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QuerySelect, Set, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use crate::entities::{companies, users};

use super::company::email_taken_or;
use super::expense::settle_open_expenses;
use super::{db_error, load_actor, load_roster, normalize_email, validate_person_name};

/// Input for adding a member to the actor's company.
#[derive(Debug, Clone)]
pub struct NewMember {
    /// Display name.
    pub name: String,
    /// Email, unique across all companies.
    pub email: String,
    /// Initial role.
    pub role: Role,
}

/// User repository.
#[derive(Clone)]
pub struct UserRepository {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
    bus: EventBus,
}

impl fmt::Debug for UserRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRepository").finish_non_exhaustive()
    }
}

impl UserRepository {
    /// Creates a new user repository.
    ///
    /// Role changes may complete quorum on open expenses and publish the
    /// resulting events on `bus`.
    #[must_use]
    pub fn new(db: DatabaseConnection, clock: Arc<dyn Clock>, bus: EventBus) -> Self {
        Self { db, clock, bus }
    }

    /// Adds a member to the actor's company. Founders only.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for a member, `Validation` for a malformed payload
    /// or an email already in use.
    pub async fn add_member(
        &self,
        actor_id: Uuid,
        input: NewMember,
    ) -> Result<users::Model, ExpenseError> {
        let name = validate_person_name(&input.name)?;
        let email = normalize_email(&input.email)?;

        let actor = load_actor(&self.db, actor_id).await?;
        AuthorizationGate::authorize_company(
            Some(&actor),
            actor.company_id,
            Action::ManageCompany,
        )?;

        let now = self.clock.now().into();
        let user = users::ActiveModel {
            id: Set(Uuid::now_v7()),
            company_id: Set(actor.company_id),
            name: Set(name),
            email: Set(email),
            role: Set(input.role.into()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(|e| email_taken_or(e, &input.email))?;

        info!(
            company_id = %actor.company_id,
            user_id = %user.id,
            role = %input.role,
            "member added"
        );
        Ok(user)
    }

    /// Changes a member's role. Founders only.
    ///
    /// The company row is locked so concurrent demotions cannot both pass the
    /// last-founder check. Open expenses whose current phase the new roster
    /// completes advance in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user is not in the actor's company and
    /// `Validation` if the change would leave the company without a founder.
    pub async fn change_role(
        &self,
        actor_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<users::Model, ExpenseError> {
        let txn = self.db.begin().await.map_err(db_error)?;

        let actor = load_actor(&txn, actor_id).await?;
        AuthorizationGate::authorize_company(
            Some(&actor),
            actor.company_id,
            Action::ManageCompany,
        )?;

        companies::Entity::find_by_id(actor.company_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error)?
            .ok_or(ExpenseError::NotFound {
                entity: "Company",
                id: actor.company_id,
            })?;

        let target = users::Entity::find_by_id(user_id)
            .one(&txn)
            .await
            .map_err(db_error)?
            .filter(|u| u.company_id == actor.company_id)
            .ok_or(ExpenseError::NotFound {
                entity: "User",
                id: user_id,
            })?;

        let roster = load_roster(&txn, actor.company_id).await?;
        QuorumPolicy::ensure_founder_remains(&roster, user_id, role)?;

        let now = self.clock.now();
        let mut active: users::ActiveModel = target.into();
        active.role = Set(role.into());
        active.updated_at = Set(now.into());
        let updated = active.update(&txn).await.map_err(db_error)?;

        let roster = load_roster(&txn, actor.company_id).await?;
        let settled = settle_open_expenses(&txn, actor.company_id, &roster, now).await?;

        txn.commit().await.map_err(db_error)?;

        info!(
            company_id = %actor.company_id,
            user_id = %user_id,
            role = %role,
            actor_id = %actor_id,
            settled = settled.len(),
            "member role changed"
        );
        let events = settled.into_iter().map(|(expense_id, kind)| ExpenseEvent {
            kind,
            expense_id,
            company_id: actor.company_id,
            actor_id,
            occurred_at: now,
        });
        self.bus.publish_all(events);
        Ok(updated)
    }
}
