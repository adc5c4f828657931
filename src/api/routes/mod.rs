//! API Routes
//!
//! Route handlers organized by functionality.

pub mod events;
pub mod health;
pub mod queries;
pub mod records;
pub mod stats;
