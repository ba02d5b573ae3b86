//! Engine configuration.
//!
//! Settings are read from a TOML file and control SQL dialect selection,
//! batched relation loading and lazy refetch behavior.

mod settings;

pub use settings::{EngineSettings, SettingsError};
