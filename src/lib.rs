//! # Restock
//!
//! Crawls product sources, records availability in a catalog and notifies
//! channels when a product comes back in stock or sells out.

pub mod app;
pub mod config;
pub mod crawler;
pub mod currency;
pub mod db;
pub mod detector;
pub mod error;
pub mod filters;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod monitor;
pub mod notifications;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod sources;
pub mod telemetry;
pub use migration;
