//! Courier - API plumbing for the delivery app
//!
//! This library provides the request layer shared by the Courier tools:
//! a JSON client with retrying requests, typed decoding of list responses,
//! and reducers that track request progress and model data.

pub mod client;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod parse;
pub mod reducers;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use client::{ApiClient, ApiRetryOptions};
pub use config::Config;
pub use error::{ApiError, CourierError, ErrorKind, Result};
pub use reducers::Reducer;
pub use types::{ApiCallState, ModelApiCallState, ModelDataState, ModelInstance, ResultList};
