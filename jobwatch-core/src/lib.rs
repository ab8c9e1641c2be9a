#![doc = "jobwatch-core: core logic library for jobwatch."]

//! This crate holds the data model, persistence and orchestration for a
//! scrape-filter-notify cycle. Network adapters (LinkedIn, Gemini, SMTP) live in
//! the `jobwatch` binary crate and plug in through the traits in [`contract`].
//!
//! # Usage
//! Build a [`config::Settings`], a [`store::JobStore`] and three adapters, then
//! call [`cycle::run_cycle`].

pub mod config;
pub mod contract;
pub mod cycle;
pub mod error;
pub mod filter;
pub mod report;
pub mod stats;
pub mod store;
