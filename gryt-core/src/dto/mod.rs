//! Data Transfer Objects for the agent HTTP API
//!
//! DTOs mirror the JSON bodies exchanged with the CI control plane. They are
//! converted into domain types at the API boundary.

pub mod health;
pub mod job;
