//! Cycle phase and period prediction.
//!
//! [`prediction`] holds the pure date arithmetic; [`validation`] rejects
//! out-of-range input before it reaches it, and [`tracker`] keeps settings
//! and logged days per profile.

pub mod config;
pub mod models;
pub mod prediction;
pub mod tracker;
pub mod validation;
