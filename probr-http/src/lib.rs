//! Minimal GET client the probes run on: hyper with rustls, one timeout per exchange.

#![forbid(unsafe_code)]

mod client;
mod error;
mod types;
mod util;

pub use client::HttpClient;
pub use error::{Error, FailureKind, Result};
pub use types::{HttpRequest, HttpResponse};
