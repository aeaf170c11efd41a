//! Cooperative run cancellation.
//!
//! A raised token stops not-yet-started steps from starting and ends retry
//! backoff early. Steps already running are never interrupted.

mod token;

pub use token::CancellationToken;
