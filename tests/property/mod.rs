//! Property-based tests

pub mod fifo_proptest;
