#![doc = "bucket-relay-core: orchestration engine for bucket-relay."]

//! This crate contains the delivery pipeline that relays media from an object
//! store bucket to a rate-limited chat channel: the sent ledger, caption
//! assembly, retry with backoff, the per-item worker and the cycle scheduler.
//!
//! # Usage
//! Implement [`contract::ObjectStore`] and [`contract::DeliveryChannel`] for your
//! services (the `bucket-relay` binary ships bucket and bot API clients), open a
//! [`ledger::SentLedger`], and drive a [`scheduler::CycleScheduler`].

pub mod caption;
pub mod config;
pub mod contract;
pub mod ledger;
pub mod media;
pub mod retry;
pub mod scheduler;
pub mod worker;
