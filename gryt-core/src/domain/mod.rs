//! Core domain types
//!
//! These types describe a single job as the agent sees it: what to run, with
//! which limits, and what came out of it. They are shared between the agent
//! (which executes) and the dispatcher side (which submits and reads results).

pub mod job;
