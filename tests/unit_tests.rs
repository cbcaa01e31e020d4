//! Unit tests for configuration, builders, errors, runtime and utilities

mod unit;
