#![doc = "code-digest-core: core logic library for code-digest."]

//! This crate contains the pipeline that turns a tree of source files into
//! markdown digests produced by a remote analysis flow:
//!
//! - [`selector`] picks candidate files (extension filter, `.gitignore` rules, dedup)
//! - [`analysis`] calls the flow with bounded retry and keeps the final output
//! - [`digest`] drives both and writes the results, building a per-file report
//!
//! Cloud-specific clients live in the CLI crate; everything here talks to the
//! outside world through the traits in [`contract`].

pub mod analysis;
pub mod config;
pub mod contract;
pub mod digest;
pub mod ignore_rules;
pub mod local_store;
pub mod selector;
