//! Authentication and session gateway for the Calmon Academy platform.
//!
//! Sits between the SPA and the hosted backend: it signs users in through
//! the role-specific flows, keeps the cached session fresh, classifies
//! provider failures, and reconciles user metadata against the company
//! directory.

pub mod account;
pub mod api;
pub mod config;
pub mod directory;
pub mod errors;
pub mod functions;
pub mod primitives;
pub mod provider;
pub mod server;
pub mod session;
pub mod signin;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{AuthError, ProviderError, ProviderErrorCode};
pub use primitives::{AuthUser, Role, Session, UserMetadata};
pub use session::{SessionCheck, SessionValidator};
