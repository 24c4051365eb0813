//! Platform authentication
//!
//! Token issuance lives with the platform client; this module only tracks
//! the issued credential and its expiry.

mod cache;

pub use cache::{Authenticator, Clock, Credential, IssuedToken, SystemClock, TokenCache};
