//! Engine test binary

mod recovery_tests;
