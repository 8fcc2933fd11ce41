//! Railworld Core -- the scenery and world engine for rail simulations.
//!
//! This crate owns everything a loaded scene is made of: the spatial
//! sector grid, the node registry and name index, render-list
//! classification with mesh merging, track and overhead-wire topology,
//! the event scheduler, launchers, isolated sections, and the per-frame
//! simulation step.
//!
//! # Scene Lifecycle
//!
//! 1. **Load** -- a loader builds a [`world::World`] from a config and feeds
//!    it nodes via [`world::World::add_node`] and events via
//!    [`world::World::add_event`].
//! 2. **First init** -- [`world::World::first_init`] sorts sectors, links
//!    track and wire topology, resolves event and launcher references and
//!    queues startup events. Runs once, after the last node.
//! 3. **Step** -- [`world::World::update`] advances the clock, sub-steps
//!    vehicles, polls launchers and dispatches due events every frame.
//!
//! # Key Types
//!
//! - [`world::World`] -- every subsystem behind one handle.
//! - [`registry::NodeRegistry`] -- slotmap arena of [`node::WorldNode`]
//!   with per-kind chains and the class-scoped name index.
//! - [`grid::SpatialGrid`] -- kilometer squares subdivided into sectors,
//!   each carrying seven render lists.
//! - [`scheduler::EventScheduler`] -- the delayed-event queue with joined
//!   chains and conditional dispatch.
//! - [`topology`] -- track linking, isolated sections, wire spans and
//!   power propagation.
//! - [`context::WorldContext`] -- per-scene config, clock and RNG.

pub mod classify;
pub mod context;
pub mod divider;
pub mod error;
pub mod export;
pub mod event;
pub mod grid;
pub mod id;
pub mod isolated;
pub mod launcher;
pub mod math;
pub mod memcell;
pub mod model;
pub mod node;
pub mod registry;
pub mod rng;
pub mod scheduler;
pub mod stepper;
pub mod topology;
pub mod track;
pub mod traction;
pub mod vehicle;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
