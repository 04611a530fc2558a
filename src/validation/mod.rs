use bigdecimal::BigDecimal;
use std::fmt;

use crate::domain::cart::{IDEMPOTENCY_KEY_MAX_LEN, SELECTION_PART_MAX_LEN};

pub const REFERENCE_MAX_LEN: usize = 100;
pub const EMAIL_MAX_LEN: usize = 254;
pub const SELECTED_KEYS_MAX: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for crate::error::AppError {
    fn from(err: ValidationError) -> Self {
        crate::error::AppError::Validation(err.to_string())
    }
}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_non_negative_amount(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount < &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must not be negative"));
    }

    Ok(())
}

/// Variation, color and size take part in the comma-joined checkout
/// selection, so they may not contain commas.
pub fn validate_selection_part(field: &'static str, value: &str) -> ValidationResult {
    validate_required(field, value)?;
    validate_max_len(field, value, SELECTION_PART_MAX_LEN)?;

    if value.contains(',') {
        return Err(ValidationError::new(field, "must not contain ','"));
    }

    Ok(())
}

/// Gateway references: ASCII letters, digits, `-`, `_` and `.`.
pub fn validate_reference(reference: &str) -> ValidationResult {
    validate_required("reference", reference)?;
    validate_max_len("reference", reference, REFERENCE_MAX_LEN)?;

    if !reference
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    {
        return Err(ValidationError::new(
            "reference",
            "must contain only letters, digits, '-', '_' or '.'",
        ));
    }

    Ok(())
}

pub fn validate_idempotency_key(key: &str) -> ValidationResult {
    validate_required("Idempotency-Key", key)?;
    validate_max_len("Idempotency-Key", key, IDEMPOTENCY_KEY_MAX_LEN)?;

    if !key.chars().all(|ch| ch.is_ascii_graphic()) {
        return Err(ValidationError::new(
            "Idempotency-Key",
            "must contain only visible ASCII characters",
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> ValidationResult {
    validate_required("email", email)?;
    validate_max_len("email", email, EMAIL_MAX_LEN)?;

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ValidationError::new("email", "must be a valid email address")),
    }
}
