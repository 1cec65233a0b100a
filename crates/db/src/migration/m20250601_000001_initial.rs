//! Initial schema: companies, users, expenses and both approval ledgers.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DbBackend;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Companies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Companies::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Companies::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Companies::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(Companies::NudgeCooldownHours).integer())
                    .col(timestamp_col(Companies::CreatedAt))
                    .col(timestamp_col(Companies::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(Users::Name).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Users::Email)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::Role).string_len(16).not_null())
                    .col(timestamp_col(Users::CreatedAt))
                    .col(timestamp_col(Users::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_users_company")
                            .from(Users::Table, Users::CompanyId)
                            .to(Companies::Table, Companies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_company")
                    .table(Users::Table)
                    .col(Users::CompanyId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Expenses::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Expenses::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(Expenses::OwnerId).uuid().not_null())
                    .col(amount_col(manager.get_database_backend()))
                    .col(ColumnDef::new(Expenses::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(Expenses::Category).string_len(50).not_null())
                    .col(ColumnDef::new(Expenses::ExpenseDate).date().not_null())
                    .col(ColumnDef::new(Expenses::Description).string_len(500))
                    .col(ColumnDef::new(Expenses::Status).string_len(32).not_null())
                    .col(ColumnDef::new(Expenses::RejectedBy).uuid())
                    .col(ColumnDef::new(Expenses::RejectedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Expenses::RejectionReason).string_len(500))
                    .col(ColumnDef::new(Expenses::LastNudgeAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Expenses::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(timestamp_col(Expenses::CreatedAt))
                    .col(timestamp_col(Expenses::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_expenses_company")
                            .from(Expenses::Table, Expenses::CompanyId)
                            .to(Companies::Table, Companies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_expenses_owner")
                            .from(Expenses::Table, Expenses::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_expenses_rejected_by")
                            .from(Expenses::Table, Expenses::RejectedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_expenses_company_created")
                    .table(Expenses::Table)
                    .col(Expenses::CompanyId)
                    .col(Expenses::CreatedAt)
                    .to_owned(),
            )
            .await?;

        create_ledger(manager, Ledger::Approvals, "approvals").await?;
        create_ledger(manager, Ledger::WithdrawalApprovals, "withdrawal_approvals").await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Ledger::WithdrawalApprovals).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Ledger::Approvals).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Companies::Table).to_owned())
            .await?;
        Ok(())
    }
}

/// `numeric(19,4)` on Postgres. sea-query caps SQLite decimals at
/// precision 16.
fn amount_col(backend: DbBackend) -> ColumnDef {
    let (precision, scale) = match backend {
        DbBackend::Sqlite => (16, 4),
        _ => (19, 4),
    };
    ColumnDef::new(Expenses::Amount)
        .decimal_len(precision, scale)
        .not_null()
        .to_owned()
}

fn timestamp_col(column: impl IntoIden) -> ColumnDef {
    ColumnDef::new(column)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

/// Both ledgers share one shape: one row per (expense, approver).
async fn create_ledger(
    manager: &SchemaManager<'_>,
    table: Ledger,
    prefix: &str,
) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(table)
                .if_not_exists()
                .col(ColumnDef::new(LedgerColumn::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(LedgerColumn::ExpenseId).uuid().not_null())
                .col(ColumnDef::new(LedgerColumn::ApproverId).uuid().not_null())
                .col(timestamp_col(LedgerColumn::CreatedAt))
                .foreign_key(
                    ForeignKey::create()
                        .name(format!("fk_{prefix}_expense"))
                        .from(table, LedgerColumn::ExpenseId)
                        .to(Expenses::Table, Expenses::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name(format!("fk_{prefix}_approver"))
                        .from(table, LedgerColumn::ApproverId)
                        .to(Users::Table, Users::Id)
                        .on_delete(ForeignKeyAction::Restrict),
                )
                .to_owned(),
        )
        .await?;

    manager
        .create_index(
            Index::create()
                .name(format!("uq_{prefix}_expense_approver"))
                .table(table)
                .col(LedgerColumn::ExpenseId)
                .col(LedgerColumn::ApproverId)
                .unique()
                .to_owned(),
        )
        .await
}

#[derive(DeriveIden)]
enum Companies {
    Table,
    Id,
    Name,
    Currency,
    NudgeCooldownHours,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    CompanyId,
    Name,
    Email,
    Role,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Expenses {
    Table,
    Id,
    CompanyId,
    OwnerId,
    Amount,
    Currency,
    Category,
    ExpenseDate,
    Description,
    Status,
    RejectedBy,
    RejectedAt,
    RejectionReason,
    LastNudgeAt,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden, Clone, Copy)]
enum Ledger {
    Approvals,
    WithdrawalApprovals,
}

#[derive(DeriveIden)]
enum LedgerColumn {
    Id,
    ExpenseId,
    ApproverId,
    CreatedAt,
}
