//! # chron-core
//!
//! Core types and the pure half of the change capture engine for Chronicle.
//!
//! This crate performs no I/O. It provides:
//! - Value and row representations for audited tables
//! - Table schema metadata with per-column audit flags
//! - The column policy resolver and a process-lifetime policy cache
//! - Named and inline value transformers
//! - The row diff engine producing ordered field changes
//! - The mutation hook interface hosts implement
//! - Read models for stored changesets, actions, and changes
//! - Cross-cutting error types

pub mod diff;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod mutation;
pub mod policy;
pub mod schema;
pub mod transform;
pub mod value;
