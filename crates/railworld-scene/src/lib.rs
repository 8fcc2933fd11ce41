//! Railworld Scene -- the legacy scene-text loader.
//!
//! Parses the token-stream scenery format into a live
//! [`railworld_core::world::World`]: node statements become registry
//! nodes, event statements feed the scheduler, trainsets spawn coupled
//! vehicles, and the presentation statements (atmo, light, sky, cameras)
//! are collected into [`loader::SceneMeta`] for a renderer to consume.
//!
//! The usual entry point is [`loader::load_str`] with a
//! [`config::LoaderConfig`], which can itself be deserialized from RON.

pub mod config;
pub mod error;
pub mod export;
pub mod loader;
pub mod tokenizer;

pub use config::LoaderConfig;
pub use error::SceneError;
pub use loader::{load_str, LoadedScene, SceneMeta};
