// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration for the mnemo memory subsystem.
//!
//! TOML files follow the XDG hierarchy, environment variables override
//! with the `MNEMO_` prefix, and every section carries compiled defaults
//! so a zero-config start works.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};

/// Error type surfaced by the config loaders.
pub use figment::Error as ConfigFileError;
pub use model::{
    CaptureConfig, ContextConfig, LanguageModelConfig, MemoryConfig, MnemoConfig, RecallConfig,
    ReflectionConfig, StoreConfig,
};
