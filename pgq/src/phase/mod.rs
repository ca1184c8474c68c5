//! Postgres protocol flow.
//!
//! <https://www.postgresql.org/docs/current/protocol-flow.html>
mod auth;
mod startup;
mod simple_query;

pub use auth::{AuthError, AuthNegotiator, AuthState, md5_password};
pub use startup::{StartupResponse, startup};
pub use simple_query::{QueryResult, ResultDecoder, simple_query};
