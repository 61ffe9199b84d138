//! Domain models
//!
//! This module contains all domain models used throughout the application.

pub mod exercise;
pub mod language;
pub mod submission;
pub mod user;

pub use exercise::*;
pub use language::*;
pub use submission::*;
pub use user::*;
