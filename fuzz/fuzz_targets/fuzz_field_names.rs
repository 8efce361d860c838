// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for schema compilation with arbitrary field names

#![no_main]

use libfuzzer_sys::fuzz_target;
use shelf_schema::{FieldSpec, RecordTypeDecl, SchemaError};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let valid = !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');

        // Compilation must never panic, and must agree with the name rule
        let result = RecordTypeDecl::new("fuzz")
            .field(FieldSpec::new("pk").primary_key())
            .field(FieldSpec::new(s))
            .compile();
        match result {
            Ok(schema) => assert!(valid && schema.has_index(s)),
            Err(SchemaError::InvalidFieldName { .. }) => assert!(!valid),
            Err(SchemaError::DuplicateField { .. }) => assert_eq!(s, "pk"),
            Err(other) => panic!("unexpected error: {other}"),
        }

        // Unindexed fields accept any name
        let unindexed = RecordTypeDecl::new("fuzz")
            .field(FieldSpec::new("pk").primary_key())
            .field(FieldSpec::new(s).no_index())
            .compile();
        assert!(unindexed.is_ok() || s == "pk");
    }
});
