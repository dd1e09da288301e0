//! Prelude module - commonly used types for convenient import.
//!
//! Use `use attorn_test::prelude::*;` to import all essential types.

// Fixtures
pub use crate::fixtures::{
    TEST_DELEGATE, TEST_PRINCIPAL, init_test_logging, permit_all_policy, test_config,
    test_engine_builder, test_engine_builder_with, test_grant_request, test_keys, test_owner, test_validity,
    write_key_file,
};

// Mocks
pub use crate::mocks::{FlakySharedCache, MockDataSource, MockRegistry, RecordingHandler};
