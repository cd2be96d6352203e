//! Gryt Core
//!
//! Core types shared by the Gryt CI agent and its callers.
//!
//! This crate contains:
//! - Domain types: the job request, resource limits, and execution result
//! - DTOs: wire shapes of the agent's HTTP API

pub mod domain;
pub mod dto;
