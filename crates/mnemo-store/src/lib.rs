// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage tiers for the mnemo memory subsystem.
//!
//! - **HotStore**: SQLite-backed vector store, one row per memory id
//! - **WriteQueue**: single-consumer serial executor all mutations pass through
//! - **Archive**: append-only JSONL journal with streaming keyword search
//!
//! Reads go directly to the tiers; every mutation (hot upsert/delete,
//! archive append) is funneled through the WriteQueue so that crash
//! recovery reflects exactly the writes acknowledged to callers.

pub mod archive;
pub mod hot;
pub mod queue;

pub use archive::Archive;
pub use hot::{HotStore, SearchParams};
pub use queue::{WriteQueue, WriteQueueStats};
