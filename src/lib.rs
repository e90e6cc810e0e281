//! Git LFS batch API server.
//!
//! The interesting part lives in [`services::batch_service`]: given an
//! operation and a list of objects it decides, per object, what the client
//! has to do and hands out signed, expiring links for it. Everything else
//! is the HTTP surface and the stores that engine consults.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
