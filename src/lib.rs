//! # Gardi (Account Identity and Session Control)
//!
//! `gardi` is the authentication and session subsystem of a community web
//! application. Accounts are reachable through two credential kinds:
//!
//! - a cryptographic wallet keypair, proven by signing a single-use server
//!   challenge with Ed25519, and
//! - an email/password pair, verified against an Argon2 hash.
//!
//! Both paths converge on the same issuance pipeline: a signed bearer token
//! backed by a session record, delivered as a cookie and in the JSON body.
//! Sessions live in `PostgreSQL` rows so a cryptographically valid token can
//! still be revoked server-side (logout, password change, password-reset
//! redemption).
//!
//! ## Single-use tokens
//!
//! Wallet challenges and password-reset tokens are consumed through one
//! conditional `UPDATE … WHERE used/consumed IS NULL AND expires_at > NOW()`
//! statement, so two concurrent redeemers cannot both succeed.
//!
//! ## Notification outbox
//!
//! Password-reset emails are enqueued in the same transaction that persists
//! the reset token and delivered later by a background worker, keeping
//! outbound dispatch off the request path.

pub mod api;
pub mod cli;
