//! # agora-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AgoraSettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `AGORA_*` overrides (highest priority)
//!
//! The binary loads settings once and hands each component the section it
//! needs; there is no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, settings_path};
pub use types::*;
