//! Execution context handed to steps.

mod inputs;

pub use inputs::StepInputs;
