//! CLI integration tests for `vigild`.

mod cli_tests;
mod common;
