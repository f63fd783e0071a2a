//! Contact Gate - contact form submission pipeline
//!
//! This crate validates contact form submissions and guards them with
//! single-use anti-replay tokens and sliding-window rate limiting. The
//! [`gate::SubmissionGate`] drives a client session; the [`server`] module
//! enforces the same rules on the backend.

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
pub mod sanitize;
pub mod server;
pub mod session;
pub mod token;
pub mod transport;
pub mod validation;

pub use error::{ContactGateError, Result, SubmitError};
pub use gate::{FormMessage, MessageKind, SubmissionGate, SubmitSuccess};
