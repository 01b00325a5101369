//! Deterministic, pure logic shared by the test driver.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod definition;
pub mod env;
pub mod resolve;
pub mod summary;
