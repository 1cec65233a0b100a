//! Payload validation for expense operations.

use chrono::NaiveDate;
use cofound_shared::types::money::MINOR_UNIT_SCALE;
use rust_decimal::Decimal;

use crate::expense::error::ExpenseError;

pub use cofound_shared::config::NUDGE_COOLDOWN_HOURS;

/// Largest accepted amount, 999 999 999.99. Fits every store's amount column.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x4876_E7FF, 0x17, 0, false, 2);
/// Maximum length of a rejection reason, in characters.
pub const MAX_REASON_LEN: usize = 500;
/// Maximum length of an expense category, in characters.
pub const MAX_CATEGORY_LEN: usize = 50;
/// Maximum length of an expense description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 500;
/// Maximum length of a company name, in characters.
pub const MAX_COMPANY_NAME_LEN: usize = 100;

/// Trims a rejection reason and checks it holds 1 to 500 characters.
pub fn validate_reason(raw: &str) -> Result<String, ExpenseError> {
    let reason = raw.trim();
    if reason.is_empty() {
        return Err(ExpenseError::Validation(
            "a rejection reason is required".to_string(),
        ));
    }
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(ExpenseError::Validation(format!(
            "rejection reason must be at most {MAX_REASON_LEN} characters"
        )));
    }
    Ok(reason.to_string())
}

/// Checks an amount is positive, at most `MAX_AMOUNT`, with at most two
/// fractional digits.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, ExpenseError> {
    if amount <= Decimal::ZERO {
        return Err(ExpenseError::Validation(
            "amount must be positive".to_string(),
        ));
    }
    if amount > MAX_AMOUNT {
        return Err(ExpenseError::Validation(format!(
            "amount must be at most {MAX_AMOUNT}"
        )));
    }
    if amount.normalize().scale() > MINOR_UNIT_SCALE {
        return Err(ExpenseError::Validation(format!(
            "amount must have at most {MINOR_UNIT_SCALE} decimal places"
        )));
    }
    Ok(amount)
}

fn validate_category(raw: &str) -> Result<String, ExpenseError> {
    let category = raw.trim();
    let len = category.chars().count();
    if len == 0 || len > MAX_CATEGORY_LEN {
        return Err(ExpenseError::Validation(format!(
            "category must be 1 to {MAX_CATEGORY_LEN} characters"
        )));
    }
    Ok(category.to_string())
}

fn validate_description(raw: Option<&str>) -> Result<Option<String>, ExpenseError> {
    let Some(description) = raw.map(str::trim) else {
        return Ok(None);
    };
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ExpenseError::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok((!description.is_empty()).then(|| description.to_string()))
}

/// A new expense as submitted by its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDraft {
    /// Positive amount, at most two fractional digits.
    pub amount: Decimal,
    /// Free-form category.
    pub category: String,
    /// Day the expense was incurred.
    pub date: NaiveDate,
    /// Optional description.
    pub description: Option<String>,
}

impl ExpenseDraft {
    /// Validates the draft and returns it with text fields trimmed.
    pub fn validated(self) -> Result<Self, ExpenseError> {
        Ok(Self {
            amount: validate_amount(self.amount)?,
            category: validate_category(&self.category)?,
            date: self.date,
            description: validate_description(self.description.as_deref())?,
        })
    }
}

/// Partial update of an expense's details.
///
/// `description: Some(String::new())` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpensePatch {
    /// New amount.
    pub amount: Option<Decimal>,
    /// New category.
    pub category: Option<String>,
    /// New date.
    pub date: Option<NaiveDate>,
    /// New description.
    pub description: Option<String>,
}

/// An `ExpensePatch` that passed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidPatch {
    /// New amount.
    pub amount: Option<Decimal>,
    /// New category.
    pub category: Option<String>,
    /// New date.
    pub date: Option<NaiveDate>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

impl ExpensePatch {
    /// Validates every present field.
    pub fn validated(self) -> Result<ValidPatch, ExpenseError> {
        if self.amount.is_none()
            && self.category.is_none()
            && self.date.is_none()
            && self.description.is_none()
        {
            return Err(ExpenseError::Validation(
                "at least one field must be updated".to_string(),
            ));
        }

        Ok(ValidPatch {
            amount: self.amount.map(validate_amount).transpose()?,
            category: self.category.as_deref().map(validate_category).transpose()?,
            date: self.date,
            description: self
                .description
                .as_deref()
                .map(|d| validate_description(Some(d)))
                .transpose()?,
        })
    }
}

/// Trims a company name and checks it holds 1 to 100 characters.
pub fn validate_company_name(raw: &str) -> Result<String, ExpenseError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_COMPANY_NAME_LEN {
        return Err(ExpenseError::Validation(format!(
            "company name must be 1 to {MAX_COMPANY_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Checks a nudge cooldown lies within 1 to 720 hours.
pub fn validate_cooldown_hours(hours: u32) -> Result<u32, ExpenseError> {
    if NUDGE_COOLDOWN_HOURS.contains(&hours) {
        Ok(hours)
    } else {
        Err(ExpenseError::Validation(format!(
            "nudge cooldown must be between {} and {} hours",
            NUDGE_COOLDOWN_HOURS.start(),
            NUDGE_COOLDOWN_HOURS.end()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn draft() -> ExpenseDraft {
        ExpenseDraft {
            amount: dec!(50.00),
            category: "  Travel ".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 4, 3).unwrap(),
            description: Some("   ".to_string()),
        }
    }

    #[test]
    fn test_reason_is_trimmed() {
        assert_eq!(validate_reason("  over budget \n").unwrap(), "over budget");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t\n")]
    fn test_blank_reason_rejected(#[case] raw: &str) {
        assert!(matches!(
            validate_reason(raw),
            Err(ExpenseError::Validation(_))
        ));
    }

    #[test]
    fn test_reason_length_counts_characters() {
        let max = "é".repeat(MAX_REASON_LEN);
        assert_eq!(validate_reason(&max).unwrap(), max);
        assert!(validate_reason(&"x".repeat(MAX_REASON_LEN + 1)).is_err());
    }

    #[rstest]
    #[case(dec!(0.01), true)]
    #[case(dec!(50), true)]
    #[case(dec!(12.50), true)]
    #[case(dec!(12.500), true)]
    #[case(dec!(12.505), false)]
    #[case(dec!(0), false)]
    #[case(dec!(-1), false)]
    #[case(dec!(999999999.99), true)]
    #[case(dec!(1000000000.00), false)]
    #[case(dec!(79228162514264337593543950335), false)]
    fn test_amount(#[case] amount: Decimal, #[case] ok: bool) {
        assert_eq!(validate_amount(amount).is_ok(), ok);
    }

    #[test]
    fn test_max_amount_value() {
        assert_eq!(MAX_AMOUNT, dec!(999999999.99));
        assert_eq!(MAX_AMOUNT.to_string(), "999999999.99");
    }

    #[test]
    fn test_draft_is_normalized() {
        let valid = draft().validated().unwrap();
        assert_eq!(valid.category, "Travel");
        assert_eq!(valid.description, None);
    }

    #[test]
    fn test_draft_category_bounds() {
        let mut d = draft();
        d.category = " ".to_string();
        assert!(d.validated().is_err());

        let mut d = draft();
        d.category = "c".repeat(MAX_CATEGORY_LEN + 1);
        assert!(d.validated().is_err());
    }

    #[test]
    fn test_empty_patch_rejected() {
        assert!(ExpensePatch::default().validated().is_err());
    }

    #[test]
    fn test_patch_clears_description() {
        let patch = ExpensePatch {
            description: Some(String::new()),
            ..ExpensePatch::default()
        }
        .validated()
        .unwrap();
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.amount, None);
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(24, true)]
    #[case(720, true)]
    #[case(721, false)]
    fn test_cooldown_hours(#[case] hours: u32, #[case] ok: bool) {
        assert_eq!(validate_cooldown_hours(hours).is_ok(), ok);
    }

    #[test]
    fn test_company_name() {
        assert_eq!(validate_company_name(" Acme ").unwrap(), "Acme");
        assert!(validate_company_name("").is_err());
    }
}
