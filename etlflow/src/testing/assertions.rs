//! Test assertions for run outcomes.

use crate::core::{RunStatus, StepStatus};
use crate::pipeline::Run;

/// Asserts that the run finished with the expected status.
pub fn assert_run_status(run: &Run, expected: RunStatus) {
    assert_eq!(
        run.status, expected,
        "Expected run status {:?}, got {:?}. Steps: {:?}",
        expected,
        run.status,
        run.steps().map(|r| (&r.step, r.status)).collect::<Vec<_>>()
    );
}

/// Asserts that a step ended with the expected status.
pub fn assert_step_status(run: &Run, step: &str, expected: StepStatus) {
    let actual = run.step_status(step);
    assert_eq!(
        actual,
        Some(expected),
        "Expected step '{}' to be {:?}, got {:?} ({:?})",
        step,
        expected,
        actual,
        run.step(step).and_then(|r| r.detail())
    );
}

/// Asserts that a step succeeded.
pub fn assert_step_succeeded(run: &Run, step: &str) {
    assert_step_status(run, step, StepStatus::Succeeded);
}

/// Asserts how many attempts a step made.
pub fn assert_attempts(run: &Run, step: &str, expected: usize) {
    let actual = run.step(step).map(|r| r.attempt_count());
    assert_eq!(
        actual,
        Some(expected),
        "Expected {} attempts for step '{}', got {:?}",
        expected,
        step,
        actual
    );
}
