//! Request/response message API over HTTP

mod client;

pub use client::{ApiError, ErrorDetail, HttpMessageApi};
