#![doc = "cur-sync-core: core logic library for cur-sync."]

//! This crate holds the reconciliation pipeline for billing report deliveries: the
//! manifest model, key rules, destination mapping, the copy-then-delete switchover,
//! catalog sync and failure reporting. Cloud SDK adapters live in the `cur-sync` binary
//! crate and plug in through the traits in [`contract`].
//!
//! # Usage
//! Build a [`synchronise::SyncContext`] from concrete clients and a
//! [`config::SyncConfig`], then hand each notification batch to
//! [`synchronise::synchronise`].

pub mod catalog;
pub mod config;
pub mod contract;
pub mod error;
pub mod event;
pub mod keys;
pub mod manifest;
pub mod mapping;
pub mod notify;
pub mod retry;
pub mod switchover;
pub mod synchronise;
