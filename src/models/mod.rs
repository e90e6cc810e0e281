//! Data models for the LFS batch service.
//!
//! `batch` holds the request-scoped model the negotiation engine works on,
//! `wire` the JSON shapes exchanged with Git LFS clients, and `object` the
//! metadata row persisted for every uploaded object.

pub mod batch;
pub mod object;
pub mod wire;
