//! Core of the Treebeard dashboard assistant.
//!
//! Resolves a dashboard to its oracle, serves the last committed dataset
//! without waiting on recomputation, owns the conversation lifecycle and the
//! upload linkage, and composes the context handed to the LLM.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! durable store and the external collaborators (refresh compute, LLM, file
//! analysis) are reached through the traits in [`store`] and [`external`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
#![allow(async_fn_in_trait)]

pub mod compose;
pub mod conversation;
pub mod dataset;
pub mod error;
pub mod etag;
pub mod external;
pub mod keys;
pub mod message;
pub mod oracle;
pub mod pipeline;
pub mod service;
pub mod session;
pub mod settings;
pub mod store;
pub mod upload;
pub mod user;

pub use error::{Error, ErrorKind, Result};
pub use service::Treebeard;
pub use settings::Settings;

#[cfg(test)]
mod testing;
