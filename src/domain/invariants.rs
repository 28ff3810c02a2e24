// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Validation Functions - Domain Invariants
//!
//! Business rules shared by the builders and the configuration layer. All
//! functions are pure (no I/O, deterministic) and return detailed errors.

/// Validation result with detailed error information
pub type ValidationResult = Result<(), ValidationError>;

/// Validation error with context
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Environment prefix violates naming rules
    #[error("Invalid environment prefix {prefix:?}: {reason}")]
    InvalidEnvironmentPrefix { prefix: String, reason: String },

    /// Database name violates engine identifier rules
    #[error("Invalid database name {name:?}: {reason}")]
    InvalidDatabaseName { name: String, reason: String },

    /// Export name violates naming rules
    #[error("Invalid export name {name:?}: {reason}")]
    InvalidExportName { name: String, reason: String },

    /// Serverless capacity range is not usable
    #[error("Invalid capacity range {min}..={max}: {reason}")]
    InvalidCapacityRange { min: f64, max: f64, reason: String },

    /// Availability domain count out of bounds
    #[error("Availability domains must be between 1 and {max}, got {actual}")]
    InvalidAvailabilityDomains { actual: u8, max: u8 },

    /// Business rule violation
    #[error("Business rule violated: {0}")]
    BusinessRule(String),
}

/// Maximum number of availability domains a network may span
pub const MAX_AVAILABILITY_DOMAINS: u8 = 6;

/// Smallest serverless capacity step
pub const CAPACITY_STEP: f64 = 0.5;

/// Maximum serverless capacity
pub const MAX_CAPACITY: f64 = 128.0;

/// Normalize a database name for the engine
///
/// The engine treats identifiers case-sensitively in some contexts, so names
/// are lower-cased before use. Normalization is idempotent.
///
/// ```rust
/// use layered_stack::domain::normalize_database_name;
///
/// assert_eq!(normalize_database_name("DevDatabase"), "devdatabase");
/// ```
pub fn normalize_database_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Validate environment prefix
///
/// # Rules
/// - 1 to 32 characters
/// - Lowercase ASCII letters, digits and hyphens
/// - Starts with a letter
pub fn validate_environment_prefix(prefix: &str) -> ValidationResult {
    let fail = |reason: &str| ValidationError::InvalidEnvironmentPrefix {
        prefix: prefix.to_string(),
        reason: reason.to_string(),
    };

    if prefix.is_empty() || prefix.len() > 32 {
        return Err(fail("must be 1-32 characters"));
    }
    if !prefix.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(fail("must start with a lowercase letter"));
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(fail("only lowercase letters, digits and hyphens allowed"));
    }
    Ok(())
}

/// Validate a (normalized) database name
///
/// # Rules
/// - 1 to 64 characters
/// - Starts with a letter
/// - Letters, digits and underscores only
pub fn validate_database_name(name: &str) -> ValidationResult {
    let fail = |reason: &str| ValidationError::InvalidDatabaseName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() || name.len() > 64 {
        return Err(fail("must be 1-64 characters"));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(fail("must start with a letter"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(fail("only letters, digits and underscores allowed"));
    }
    Ok(())
}

/// Validate a cross-stack export name
///
/// # Rules
/// - 1 to 255 characters
/// - Letters, digits, hyphens and colons
pub fn validate_export_name(name: &str) -> ValidationResult {
    if name.is_empty() || name.len() > 255 {
        return Err(ValidationError::InvalidExportName {
            name: name.to_string(),
            reason: "must be 1-255 characters".to_string(),
        });
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != ':')
    {
        return Err(ValidationError::InvalidExportName {
            name: name.to_string(),
            reason: format!("character {ch:?} not allowed"),
        });
    }
    Ok(())
}

/// Validate serverless capacity range
///
/// # Rules
/// - `CAPACITY_STEP <= min <= max <= MAX_CAPACITY`
/// - Both bounds are multiples of `CAPACITY_STEP`
pub fn validate_capacity_range(min: f64, max: f64) -> ValidationResult {
    let fail = |reason: &str| ValidationError::InvalidCapacityRange {
        min,
        max,
        reason: reason.to_string(),
    };

    if !(CAPACITY_STEP..=MAX_CAPACITY).contains(&min) || !(CAPACITY_STEP..=MAX_CAPACITY).contains(&max)
    {
        return Err(fail("bounds must lie within 0.5..=128"));
    }
    if min > max {
        return Err(fail("minimum exceeds maximum"));
    }
    let is_step = |v: f64| ((v / CAPACITY_STEP).fract()).abs() < f64::EPSILON;
    if !is_step(min) || !is_step(max) {
        return Err(fail("bounds must be multiples of 0.5"));
    }
    Ok(())
}

/// Validate availability domain count
pub fn validate_availability_domains(count: u8) -> ValidationResult {
    if count == 0 || count > MAX_AVAILABILITY_DOMAINS {
        return Err(ValidationError::InvalidAvailabilityDomains {
            actual: count,
            max: MAX_AVAILABILITY_DOMAINS,
        });
    }
    Ok(())
}
