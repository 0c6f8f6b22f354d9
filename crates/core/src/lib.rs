//! Shared types and helpers for the Depot mirror service.

pub mod config;
pub mod hash;
pub mod keys;
