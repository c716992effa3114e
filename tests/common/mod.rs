//! tests/common/mod.rs
//!
//! Public facade for the shared test fixtures, so every test crate can reach
//! them as `common::harness`.

// Not every test crate uses every fixture.
#![allow(dead_code)]
