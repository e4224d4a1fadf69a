//! Offline-caching request engine for the hike tracker web app.
//!
//! A host hands lifecycle signals and intercepted requests to a
//! [`lifecycle::Lifecycle`]; it precaches core assets on install, sweeps stale
//! cache generations on activate, and answers each request from the cache,
//! the network, or both, depending on the request's lane.

pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod lifecycle;
pub mod network;
pub mod precache;
pub mod request;
pub mod router;
pub mod strategy;

#[cfg(test)]
mod testing;
