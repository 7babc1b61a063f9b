//! Signing and verification for socket subscriptions and HTTP requests.

pub mod request;
pub mod token;
