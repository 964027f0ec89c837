//! API handlers: auth flows, self-service, and operational endpoints.

pub mod auth;
pub mod health;
pub mod me;
pub mod root;
