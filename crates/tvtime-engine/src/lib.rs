//! TV Time engine: turns pose frames and voice transcripts into earned
//! screen time, and gets that time approved by a parent.

pub mod anti_cheat;
pub mod app;
pub mod approval;
pub mod coach;
pub mod config;
pub mod events;
pub mod exercise;
pub mod geometry;
pub mod ledger;
pub mod store;
pub mod voice;

pub use app::App;
pub use config::EngineConfig;
pub use events::{AppAction, AppEvent};
