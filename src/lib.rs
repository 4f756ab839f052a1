//! In-memory published-content cache.
//!
//! Content, media and member trees live in generation-indexed stores that are
//! copied on write. Readers take a [`snapshot::PublishedSnapshot`] and see one
//! consistent generation of every store until they drop it. Writers publish
//! change events through [`cache::CacheTrigger`].

pub mod application;
pub mod cache;
pub mod config;
pub mod content;
pub mod domain;
pub mod infra;
pub mod presentation;
pub mod snapshot;
