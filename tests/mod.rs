//! Test suite for booking-sync
//!
//! This module organizes all tests

#[macro_use]
pub mod common;
pub mod integration;
pub mod property;
