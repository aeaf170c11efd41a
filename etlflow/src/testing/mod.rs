//! Testing utilities for etlflow graphs.
//!
//! This module provides:
//! - Mock steps and fetchers with call tracking
//! - Assertions over run outcomes
//! - APOD payload fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_attempts, assert_run_status, assert_step_status, assert_step_succeeded,
};
pub use fixtures::{moon_payload, moon_record, MOON_DATE};
pub use mocks::{
    FailingFetcher, FailingStep, FlakyFetcher, FlakyStep, StaticFetcher, StaticStep,
};
