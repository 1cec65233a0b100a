//! `SeaORM` entity definitions.

pub mod prelude;

pub mod approvals;
pub mod companies;
pub mod expenses;
pub mod sea_orm_active_enums;
pub mod users;
pub mod withdrawal_approvals;
