// src/lib.rs
pub mod types;
pub mod config;
pub mod metrics;
pub mod reporting;
pub mod sources;
pub mod query;
pub mod aggregate;
pub mod catalog;
pub mod filter;
