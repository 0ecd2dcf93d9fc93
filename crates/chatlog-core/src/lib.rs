//! Core types and trait definitions for the chatlog collector.
//!
//! This crate is deliberately free of HTTP, browser, and database
//! dependencies. Every other crate depends on it.

pub mod error;
pub mod message;
pub mod page;
pub mod profile;
pub mod run;
pub mod store;
pub mod target;

pub use error::{Error, Result};
