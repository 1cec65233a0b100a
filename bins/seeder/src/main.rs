//! Demo data seeder for Cofound development.
//!
//! Creates "Demo Co" with three founders and one member, then prints a
//! bearer token for each of them. Running it again reuses the existing
//! accounts and only prints fresh tokens.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::{Context, bail};
use cofound_core::expense::{ExpenseError, Role};
use cofound_core::{EventBus, SystemClock};
use cofound_db::entities::users;
use cofound_db::migration::Migrator;
use cofound_db::repositories::{NewCompany, NewMember};
use cofound_db::{CompanyRepository, UserRepository};
use cofound_shared::{AppConfig, JwtConfig, JwtService};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

const FOUNDER_EMAIL: &str = "ada@demo.cofound.dev";

const PEOPLE: [(&str, &str, Role); 3] = [
    ("Grace", "grace@demo.cofound.dev", Role::Founder),
    ("Linus", "linus@demo.cofound.dev", Role::Founder),
    ("Margaret", "margaret@demo.cofound.dev", Role::Member),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    println!("Connecting to database...");
    let db = cofound_db::connect(&config.database.url).await?;
    Migrator::up(&db, None).await?;

    println!("Seeding demo company...");
    let founder_id = seed_company(&db).await?;

    println!("Seeding team...");
    for (name, email, role) in PEOPLE {
        seed_member(&db, founder_id, name, email, role).await?;
    }

    let jwt = JwtService::new(JwtConfig {
        secret: config.jwt.secret.clone(),
        access_token_expires_minutes: 24 * 60,
    });

    println!("\nDev tokens (valid 24h):");
    let emails = std::iter::once(FOUNDER_EMAIL).chain(PEOPLE.iter().map(|(_, email, _)| *email));
    for email in emails {
        let user = find_by_email(&db, email)
            .await?
            .with_context(|| format!("{email} missing after seeding"))?;
        let role = Role::from(user.role);
        let token = jwt.generate_access_token(user.id, user.company_id, role.as_str())?;
        println!("  {:<10} {:<28} {token}", role.as_str(), email);
    }

    println!("\nSeeding complete!");
    Ok(())
}

async fn seed_company(db: &DatabaseConnection) -> anyhow::Result<Uuid> {
    if let Some(existing) = find_by_email(db, FOUNDER_EMAIL).await? {
        println!("  Demo company already exists, skipping...");
        return Ok(existing.id);
    }

    let (company, founder) = CompanyRepository::new(db.clone())
        .signup(NewCompany {
            name: "Demo Co".to_string(),
            currency: "USD".to_string(),
            nudge_cooldown_hours: None,
            founder_name: "Ada".to_string(),
            founder_email: FOUNDER_EMAIL.to_string(),
        })
        .await?;
    println!("  Created company {} ({})", company.name, company.id);
    Ok(founder.id)
}

async fn seed_member(
    db: &DatabaseConnection,
    founder_id: Uuid,
    name: &str,
    email: &str,
    role: Role,
) -> anyhow::Result<()> {
    if find_by_email(db, email).await?.is_some() {
        println!("  {email} already exists, skipping...");
        return Ok(());
    }

    let input = NewMember {
        name: name.to_string(),
        email: email.to_string(),
        role,
    };
    let users = UserRepository::new(db.clone(), Arc::new(SystemClock), EventBus::default());
    match users.add_member(founder_id, input).await {
        Ok(user) => {
            println!("  Created {role} {name} ({})", user.id);
            Ok(())
        }
        Err(ExpenseError::Forbidden(msg)) => bail!("seed founder lost its role: {msg}"),
        Err(e) => Err(e.into()),
    }
}

async fn find_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> anyhow::Result<Option<users::Model>> {
    Ok(users::Entity::find()
        .filter(users::Column::Email.eq(email))
        .one(db)
        .await?)
}
