//! WAL test binary

mod reader_tests;
