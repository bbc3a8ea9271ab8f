//! Application layer orchestrating the domain.
//!
//! This module defines the `TransferEngine`, the entry point for moving money
//! between accounts. Each transfer is one unit of work against the store;
//! concurrency is left to the store's row locks.

pub mod engine;
