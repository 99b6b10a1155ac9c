// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reflection, stats, host-facing tools, and the lifecycle coordinator
//! for the mnemo memory subsystem.
//!
//! The [`Coordinator`] owns every subsystem instance; subsystems hold
//! only immutable config and narrow trait references, so two isolated
//! coordinators can coexist in one process (tests do exactly that).

pub mod coordinator;
pub mod reflection;
pub mod stats;
pub mod tools;

pub use coordinator::{Coordinator, HostContent, HostMessage, LogSink, ProactiveSink, TurnContext};
pub use reflection::Reflection;
pub use stats::{MemoryStats, StatsCollector, WriteQueueSnapshot};
pub use tools::{
    ForgetArgs, ForgetOutcome, ListArgs, SearchArgs, SearchHit, SearchOutput, StoreArgs,
    StoreOutput,
};
