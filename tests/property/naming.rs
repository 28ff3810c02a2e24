// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Name Normalization

use layered_stack::domain::invariants::validate_database_name;
use layered_stack::domain::normalize_database_name;
use layered_stack::EnvironmentConfig;
use proptest::prelude::*;

proptest! {
    /// normalize(normalize(x)) == normalize(x)
    #[test]
    fn prop_normalization_is_idempotent(name in "\\PC{0,64}") {
        let once = normalize_database_name(&name);
        prop_assert_eq!(normalize_database_name(&once), once);
    }

    /// Normalized names carry no upper-case ASCII
    #[test]
    fn prop_normalized_names_are_lowercase(name in "[A-Za-z][A-Za-z0-9_]{0,30}") {
        let normalized = normalize_database_name(&name);
        prop_assert!(!normalized.chars().any(|c| c.is_ascii_uppercase()));
        prop_assert!(validate_database_name(&normalized).is_ok());
    }

    /// Every valid prefix yields a database name that validates
    #[test]
    fn prop_default_database_name_is_valid(prefix in "[a-z][a-z0-9]{0,15}") {
        let config = EnvironmentConfig::new(prefix);
        prop_assert!(validate_database_name(&config.database_name()).is_ok());
    }
}
