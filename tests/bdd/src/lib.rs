// BDD support library for TV Time
//
// Drives the engine context through whole scenarios: exercise sessions,
// the daily cap, voice commands, anti-cheat and the approval round-trip.

pub mod steps;
pub mod world;

pub use world::EngineWorld;
