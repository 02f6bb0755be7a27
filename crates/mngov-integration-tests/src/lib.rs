//! Integration test crate for the governance engine.
//!
//! This crate exists solely to run scenarios that drive the governance
//! manager end to end against in-memory collaborators. It has no public API.

#![forbid(unsafe_code)]
