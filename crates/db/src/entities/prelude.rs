//! Entity prelude.

pub use super::approvals::Entity as Approvals;
pub use super::companies::Entity as Companies;
pub use super::expenses::Entity as Expenses;
pub use super::users::Entity as Users;
pub use super::withdrawal_approvals::Entity as WithdrawalApprovals;
