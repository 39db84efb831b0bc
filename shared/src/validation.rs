//! Validation utilities for the publishing ledger
//!
//! Includes phone handling for Central/West African numbers (`+241`, `+237`, ...).

use rust_decimal::Decimal;

// ============================================================================
// Ledger Validations
// ============================================================================

/// A correction or manual movement must carry a non-blank reason
pub fn validate_reason(reason: &str) -> Result<(), &'static str> {
    if reason.trim().is_empty() {
        return Err("A reason is required");
    }
    if reason.len() > 500 {
        return Err("Reason must be at most 500 characters");
    }
    Ok(())
}

/// Largest number of copies one order line or ledger entry may move
pub const MAX_QUANTITY: i64 = 1_000_000;

/// Largest value a stock counter may be set to
pub const MAX_STOCK_VALUE: i64 = 1_000_000_000;

/// Order lines and partner operations move a strictly positive number of copies
pub fn validate_positive_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    if quantity > MAX_QUANTITY {
        return Err("Quantity exceeds 1 000 000 copies");
    }
    Ok(())
}

/// Signed ledger quantities (corrections) are bounded like order lines
pub fn validate_quantity_magnitude(quantity: i64) -> Result<(), &'static str> {
    if quantity.unsigned_abs() > MAX_QUANTITY as u64 {
        return Err("Quantity exceeds 1 000 000 copies");
    }
    Ok(())
}

/// Stock counters can be corrected down to zero, never below
pub fn validate_stock_value(value: i64) -> Result<(), &'static str> {
    if value < 0 {
        return Err("Stock cannot be negative");
    }
    if value > MAX_STOCK_VALUE {
        return Err("Stock exceeds 1 000 000 000 copies");
    }
    Ok(())
}

/// Prices are strictly positive amounts in F CFA
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price <= Decimal::ZERO {
        return Err("Price must be positive");
    }
    Ok(())
}

// ============================================================================
// Contact Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if email.contains('@') && email.contains('.') && email.len() >= 5 {
        Ok(())
    } else {
        Err("Invalid email format")
    }
}

/// Keep only digits and a leading `+`
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    let mut normalized = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (c == '+' && i == 0) {
            normalized.push(c);
        }
    }
    normalized
}

/// Validate an international phone number: `+` then 8 to 15 digits
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let normalized = normalize_phone(phone);
    let Some(digits) = normalized.strip_prefix('+') else {
        return Err("Phone number must start with a country code (+)");
    };
    if digits.len() < 8 || digits.len() > 15 {
        return Err("Invalid phone number length");
    }
    Ok(())
}

/// Mask the middle of a phone number before it reaches the logs
pub fn anonymize_phone(phone: &str) -> String {
    let normalized = normalize_phone(phone);
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() <= 6 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}****{}", head, tail)
}
