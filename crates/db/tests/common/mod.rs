//! Shared fixtures for repository integration tests.
//!
//! Every test gets its own in-memory SQLite database with the schema
//! migrated and a clock frozen at `t0()`.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use cofound_core::expense::{ExpenseDraft, Role};
use cofound_core::{EventBus, FixedClock};
use cofound_db::migration::{Migrator, MigratorTrait};
use cofound_db::repositories::{NewCompany, NewMember};
use cofound_db::{CompanyRepository, ExpenseRepository, UserRepository};
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

pub const DEFAULT_COOLDOWN_HOURS: u32 = 24;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap()
}

pub struct Harness {
    pub db: DatabaseConnection,
    pub clock: Arc<FixedClock>,
    pub bus: EventBus,
    pub companies: CompanyRepository,
    pub users: UserRepository,
    pub expenses: ExpenseRepository,
}

/// A company and its people, in creation order.
pub struct Team {
    pub company_id: Uuid,
    pub founders: Vec<Uuid>,
    pub members: Vec<Uuid>,
}

pub async fn setup() -> Harness {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    Migrator::up(&db, None).await.expect("Failed to migrate");

    let clock = Arc::new(FixedClock::new(t0()));
    let bus = EventBus::new(64);

    Harness {
        companies: CompanyRepository::new(db.clone()),
        users: UserRepository::new(db.clone(), clock.clone(), bus.clone()),
        expenses: ExpenseRepository::new(
            db.clone(),
            clock.clone(),
            bus.clone(),
            DEFAULT_COOLDOWN_HOURS,
        ),
        db,
        clock,
        bus,
    }
}

impl Harness {
    /// Creates a company with `founders` founders and `members` members.
    pub async fn team(&self, name: &str, founders: usize, members: usize) -> Team {
        let slug = name.to_lowercase().replace(' ', "-");
        let (company, first) = self
            .companies
            .signup(NewCompany {
                name: name.to_string(),
                currency: "USD".to_string(),
                nudge_cooldown_hours: None,
                founder_name: "Founder 0".to_string(),
                founder_email: format!("founder0@{slug}.test"),
            })
            .await
            .expect("Failed to sign up");

        let mut team = Team {
            company_id: company.id,
            founders: vec![first.id],
            members: Vec::new(),
        };

        for i in 1..founders {
            let user = self
                .users
                .add_member(
                    first.id,
                    NewMember {
                        name: format!("Founder {i}"),
                        email: format!("founder{i}@{slug}.test"),
                        role: Role::Founder,
                    },
                )
                .await
                .expect("Failed to add founder");
            team.founders.push(user.id);
        }
        for i in 0..members {
            let user = self
                .users
                .add_member(
                    first.id,
                    NewMember {
                        name: format!("Member {i}"),
                        email: format!("member{i}@{slug}.test"),
                        role: Role::Member,
                    },
                )
                .await
                .expect("Failed to add member");
            team.members.push(user.id);
        }
        team
    }
}

pub fn draft(amount: Decimal) -> ExpenseDraft {
    ExpenseDraft {
        amount,
        category: "Software".to_string(),
        date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
        description: Some("Team licences".to_string()),
    }
}
