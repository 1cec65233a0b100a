//! `SeaORM` active enums stored as strings.

use cofound_core::expense::{ExpenseStatus, Role};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stored company role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Founder.
    #[sea_orm(string_value = "FOUNDER")]
    Founder,
    /// Member.
    #[sea_orm(string_value = "MEMBER")]
    Member,
}

/// Stored expense status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseStatusDb {
    /// Waiting for founder approvals.
    #[sea_orm(string_value = "PENDING_APPROVAL")]
    PendingApproval,
    /// Approved by quorum.
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    /// Waiting for withdrawal countersignatures.
    #[sea_orm(string_value = "WITHDRAWAL_REQUESTED")]
    WithdrawalRequested,
    /// Withdrawal countersigned by quorum.
    #[sea_orm(string_value = "WITHDRAWAL_APPROVED")]
    WithdrawalApproved,
    /// Funds received.
    #[sea_orm(string_value = "RECEIVED")]
    Received,
    /// Rejected.
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
    /// Withdrawal rejected.
    #[sea_orm(string_value = "WITHDRAWAL_REJECTED")]
    WithdrawalRejected,
}

impl From<UserRole> for Role {
    fn from(role: UserRole) -> Self {
        match role {
            UserRole::Founder => Self::Founder,
            UserRole::Member => Self::Member,
        }
    }
}

impl From<Role> for UserRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Founder => Self::Founder,
            Role::Member => Self::Member,
        }
    }
}

impl From<ExpenseStatusDb> for ExpenseStatus {
    fn from(status: ExpenseStatusDb) -> Self {
        match status {
            ExpenseStatusDb::PendingApproval => Self::PendingApproval,
            ExpenseStatusDb::Approved => Self::Approved,
            ExpenseStatusDb::WithdrawalRequested => Self::WithdrawalRequested,
            ExpenseStatusDb::WithdrawalApproved => Self::WithdrawalApproved,
            ExpenseStatusDb::Received => Self::Received,
            ExpenseStatusDb::Rejected => Self::Rejected,
            ExpenseStatusDb::WithdrawalRejected => Self::WithdrawalRejected,
        }
    }
}

impl From<ExpenseStatus> for ExpenseStatusDb {
    fn from(status: ExpenseStatus) -> Self {
        match status {
            ExpenseStatus::PendingApproval => Self::PendingApproval,
            ExpenseStatus::Approved => Self::Approved,
            ExpenseStatus::WithdrawalRequested => Self::WithdrawalRequested,
            ExpenseStatus::WithdrawalApproved => Self::WithdrawalApproved,
            ExpenseStatus::Received => Self::Received,
            ExpenseStatus::Rejected => Self::Rejected,
            ExpenseStatus::WithdrawalRejected => Self::WithdrawalRejected,
        }
    }
}
