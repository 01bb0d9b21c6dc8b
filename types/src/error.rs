//! Error types shared across the batch-prediction crates.
//!
//! Every failure aborts the current request and is surfaced to the caller as
//! a single outcome; no layer retries on its own.

use std::time::Duration;

use strum::IntoStaticStr;
use thiserror::Error;

pub type SyncResult<T = ()> = Result<T, SyncError>;

/// Errors from mirroring an object tree between the store and local disk.
#[derive(Debug, Error, IntoStaticStr)]
pub enum SyncError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("local io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type InferenceResult<T = ()> = Result<T, InferenceError>;

/// Errors from the inference server process, the loopback endpoint, or the
/// request/response transcoding around it.
#[derive(Debug, Error, IntoStaticStr)]
pub enum InferenceError {
    #[error("inference server process error: {0}")]
    Process(String),

    #[error("inference server not ready after {0:?}")]
    StartupTimeout(Duration),

    #[error("inference request failed: {0}")]
    Request(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("prediction failed: {0}")]
    Prediction(String),
}

pub type PredictResult<T = ()> = Result<T, PredictError>;

/// Outcome of one whole prediction request.
///
/// `Validation` covers malformed request parameters and is the only variant
/// the HTTP surface reports as a client error; everything else is a server
/// failure.
#[derive(Debug, Error, IntoStaticStr)]
pub enum PredictError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}
