//! Model, terrain and sound payloads.
//!
//! Rendering itself is a collaborator; the core only stores what events
//! mutate (light states, queued animations, playback state) and what the
//! classifier and exporter need.

use serde::{Deserialize, Serialize};

use crate::event::AnimationChannel;
use crate::id::NodeId;

/// Number of addressable light slots on a model.
pub const MAX_MODEL_LIGHTS: usize = 8;

/// A queued animation, applied by the stepper's animation flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAnimation {
    pub channel: AnimationChannel,
    pub submodel: String,
    /// Rotate/translate target (x, y, z) plus speed; digital channels use
    /// slot 0 as the displayed value.
    pub params: [f64; 4],
}

/// A placed scenery model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Model resource path from the scene entry.
    pub path: String,

    /// Heading in degrees about Y, from the active rotate statement.
    pub heading_deg: f64,

    /// Light states, `0.0..=1.0`; events may set fractions.
    pub lights: Vec<f64>,

    /// Animations waiting for the next flush.
    pub pending_animations: Vec<QueuedAnimation>,

    /// Terrain container models link their per-square patches here.
    pub terrain_patches: Vec<NodeId>,
}

impl Model {
    pub fn new(path: &str, heading_deg: f64) -> Self {
        Self {
            path: path.to_string(),
            heading_deg,
            lights: vec![0.0; MAX_MODEL_LIGHTS],
            pending_animations: Vec::new(),
            terrain_patches: Vec::new(),
        }
    }

    /// Set one light state; out-of-range slots are ignored.
    pub fn set_light(&mut self, index: usize, state: f64) {
        if let Some(slot) = self.lights.get_mut(index) {
            *slot = state;
        }
    }

    pub fn queue_animation(&mut self, animation: QueuedAnimation) {
        self.pending_animations.push(animation);
    }

    /// Drain queued animations; returns how many were applied.
    pub fn flush_animations(&mut self) -> usize {
        let n = self.pending_animations.len();
        self.pending_animations.clear();
        n
    }
}

/// A terrain patch covering one kilometer square; the node name carries
/// the 3+3 digit square code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerrainPatch {
    /// Owning terrain container node.
    pub container: Option<NodeId>,
}

/// Sound playback request state; the audio backend polls it every frame
/// through the hidden render list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SoundState {
    #[default]
    Stopped,
    PlayOnce,
    Looping,
}

/// A positioned sound emitter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoundEmitter {
    pub sample: String,
    pub state: SoundState,
}

impl SoundEmitter {
    pub fn new(sample: &str) -> Self {
        Self {
            sample: sample.to_string(),
            state: SoundState::Stopped,
        }
    }

    /// Apply a sound event action: 1 play, -1 loop, 0 stop.
    pub fn apply(&mut self, action: i32) {
        self.state = match action {
            0 => SoundState::Stopped,
            -1 => SoundState::Looping,
            _ => SoundState::PlayOnce,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_set_ignores_out_of_range() {
        let mut model = Model::new("models/sema.t3d", 0.0);
        model.set_light(2, 1.0);
        model.set_light(99, 1.0);
        assert_eq!(model.lights[2], 1.0);
    }

    #[test]
    fn animation_queue_flush() {
        let mut model = Model::new("models/sema.t3d", 0.0);
        model.queue_animation(QueuedAnimation {
            channel: AnimationChannel::Rotate,
            submodel: "ramie1".into(),
            params: [0.0, 0.0, 45.0, 2.0],
        });
        assert_eq!(model.flush_animations(), 1);
        assert!(model.pending_animations.is_empty());
    }

    #[test]
    fn sound_actions() {
        let mut emitter = SoundEmitter::new("sounds/dzwonek.wav");
        emitter.apply(1);
        assert_eq!(emitter.state, SoundState::PlayOnce);
        emitter.apply(-1);
        assert_eq!(emitter.state, SoundState::Looping);
        emitter.apply(0);
        assert_eq!(emitter.state, SoundState::Stopped);
    }
}
