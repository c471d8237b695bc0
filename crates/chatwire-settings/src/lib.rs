//! # chatwire-settings
//!
//! Settings are resolved in three layers, lowest priority first:
//! 1. compiled defaults ([`ChatwireSettings::default()`])
//! 2. `~/.chatwire/settings.json`, deep-merged over the defaults
//! 3. `CHATWIRE_*` environment variables

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
