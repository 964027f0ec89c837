//! Auth handlers and supporting modules.
//!
//! Two login paths, one issuance pipeline: wallet challenge/verify and
//! email/password both end in [`session::start_session`], which signs a
//! bearer token and persists the session row that makes it revocable.
//!
//! ## Single-use guarantees
//!
//! Wallet challenges and password reset tokens are spent with a conditional
//! `UPDATE … RETURNING`; the store, not application code, arbitrates races.
//!
//! ## Secrets
//!
//! The token-signing secret arrives via configuration and never has a
//! runtime fallback: a deployment without it refuses to start rather than
//! silently invalidating every session on restart.

pub(crate) mod login;
pub mod password;
pub(crate) mod principal;
pub(crate) mod register;
pub(crate) mod reset;
pub mod role;
pub(crate) mod session;
pub mod state;
pub(crate) mod storage;
pub mod token;
pub(crate) mod types;
pub(crate) mod utils;
pub(crate) mod wallet;

pub use principal::{optional_auth, require_auth, AuthRejection, Principal};
pub use role::{determine_role, Role};
pub use state::{AuthConfig, AuthState};
pub use token::{Claims, TokenCodec};
