//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Channel` trait. Domain code must not depend on transport-specific
//! types.

pub mod memory;
