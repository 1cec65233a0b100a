//! Database migrations.
//!
//! Migrations are managed using sea-orm-migration. The schema is written with
//! the schema builder so it runs on PostgreSQL and on SQLite.

pub use sea_orm_migration::prelude::*;

mod m20250601_000001_initial;

/// Migrator for running database migrations.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250601_000001_initial::Migration)]
    }
}
