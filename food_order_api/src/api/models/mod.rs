//! API request and response data models.
//!
//! These define the public JSON contract and are kept separate from the storage models.
//! Request bodies deserialize into typed structs whose fields are all optional, so a
//! missing field is reported by validation rather than by serde. Validation collects
//! every failure into [`FieldErrors`], returned as a 400 of the form
//! `{"field": ["message", ...]}`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::errors::Error;

pub mod auth;
pub mod orders;
pub mod products;
pub mod tasks;
pub mod users;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const NULL: &str = "This field may not be null.";

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.0).unwrap_or(Value::Null)
    }

    /// `Ok(())` when nothing was recorded, otherwise a 400 carrying the messages.
    pub fn into_result(self) -> Result<(), Error> {
        if self.is_empty() { Ok(()) } else { Err(self.into()) }
    }
}

impl From<FieldErrors> for Error {
    fn from(errors: FieldErrors) -> Self {
        Error::Validation { errors: errors.to_value() }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Read a required, non-blank string field with a length cap.
pub fn required_string(errors: &mut FieldErrors, field: &str, value: Option<&str>, max_len: usize) -> Option<String> {
    match value.map(str::trim) {
        None => {
            errors.add(field, REQUIRED);
            None
        }
        Some("") => {
            errors.add(field, BLANK);
            None
        }
        Some(s) if s.chars().count() > max_len => {
            errors.add(field, format!("Ensure this field has no more than {max_len} characters."));
            None
        }
        Some(s) => Some(s.to_string()),
    }
}

/// Enforce `max_digits`/`decimal_places` the way a fixed-precision column would.
pub fn check_decimal(decimal: Decimal, max_digits: usize, decimal_places: usize) -> Result<Decimal, String> {
    let scale = decimal.scale() as usize;
    let digits = decimal.mantissa().unsigned_abs().to_string().len();
    let (total, places) = if scale > digits { (scale, scale) } else { (digits, scale) };
    let whole = total - places;

    if total > max_digits {
        return Err(format!("Ensure that there are no more than {max_digits} digits in total."));
    }
    if places > decimal_places {
        return Err(format!("Ensure that there are no more than {decimal_places} decimal places."));
    }
    if whole > max_digits - decimal_places {
        return Err(format!(
            "Ensure that there are no more than {} digits before the decimal point.",
            max_digits - decimal_places
        ));
    }
    Ok(decimal)
}

/// Render money the way fixed two-place columns do, e.g. `10` -> `10.00`.
pub fn money(mut value: Decimal) -> Decimal {
    value.rescale(2);
    value
}
