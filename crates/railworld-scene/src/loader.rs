//! The scene-text loader: statements in, a ready [`World`] out.
//!
//! The format is the legacy token stream: a `node` statement carries two
//! visibility radii, a name and a type keyword, then type-specific fields
//! up to the type's closing token. Positions are relative to the active
//! `origin` offset (a stack, nestable to depth 100) and rotated by the
//! active `rotate` statement. Almost every malformed construct is logged
//! and skipped; only origin stack misuse aborts the load.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use railworld_core::event::{flags, AnimationChannel, Event, EventAction, EventRef, NodeRef};
use railworld_core::id::{NodeId, TextureId};
use railworld_core::launcher::EventLauncher;
use railworld_core::math::Vec3;
use railworld_core::memcell::{CellCommand, MemoryCell};
use railworld_core::model::{Model, SoundEmitter};
use railworld_core::node::{render_flags, Geometry, NodePayload, Primitive, Vertex, WorldNode};
use railworld_core::registry::NameClass;
use railworld_core::track::{
    SwitchExtension, Track, TrackKind, CATEGORY_RAIL, CATEGORY_RIVER, CATEGORY_ROAD,
};
use railworld_core::traction::{PowerSource, TractionSpan, WireMaterial};
use railworld_core::vehicle::Vehicle;
use railworld_core::world::World;

use crate::config::LoaderConfig;
use crate::error::SceneError;
use crate::tokenizer::Tokenizer;

/// Maximum nesting of `origin` blocks.
const ORIGIN_STACK_LIMIT: usize = 100;

/// Couplers further apart than this silently lose their linkage.
const COUPLER_GAP_LIMIT: f64 = 0.5;

/// Lead shift applied to a standing consist whose start track carries an
/// occupancy event, so the event is not swallowed on spawn.
const EVENT_TRACK_LEAD_SHIFT: f64 = 8.0;

/// Coupling bit marking a depot-locked (unsplittable) linkage.
pub const COUPLING_LOCKED: u32 = 0x100;

/// Consist placement advance per vehicle; real dimensions belong to the
/// physics collaborator.
const VEHICLE_SPACING: f64 = 10.0;

// ---------------------------------------------------------------------
// results
// ---------------------------------------------------------------------

/// One free-camera starting position from a `camera` statement.
#[derive(Debug, Clone, Default)]
pub struct CameraInit {
    pub position: Vec3,
    pub angles_deg: Vec3,
    pub index: i32,
}

/// Presentation settings collected from the non-node statements; the
/// renderer consumes these, the engine does not.
#[derive(Debug, Clone)]
pub struct SceneMeta {
    pub atmo_color: [f64; 3],
    pub fog_start: f64,
    pub fog_end: f64,
    pub fog_color: [f64; 3],
    pub light_direction: Vec3,
    pub ambient: [f64; 3],
    pub diffuse: [f64; 3],
    pub specular: [f64; 3],
    pub sky: String,
    pub cameras: Vec<CameraInit>,
    pub description: String,
    pub sunrise: (u32, u32),
    pub sunset: (u32, u32),
}

impl Default for SceneMeta {
    fn default() -> Self {
        Self {
            atmo_color: [0.0; 3],
            fog_start: 0.0,
            fog_end: 0.0,
            fog_color: [0.0; 3],
            light_direction: Vec3::new(0.0, -1.0, 0.0),
            ambient: [0.4; 3],
            diffuse: [0.4; 3],
            specular: [0.2; 3],
            sky: String::new(),
            cameras: Vec::new(),
            description: String::new(),
            sunrise: (6, 0),
            sunset: (20, 0),
        }
    }
}

/// A fully loaded scene: the initialized world plus presentation settings.
#[derive(Debug)]
pub struct LoadedScene {
    pub world: World,
    pub meta: SceneMeta,
}

/// Load a scene from text with the given loader configuration.
pub fn load_str(text: &str, config: LoaderConfig) -> Result<LoadedScene, SceneError> {
    SceneLoader::new(config).load(text)
}

// ---------------------------------------------------------------------
// token helpers
// ---------------------------------------------------------------------

fn need<'a>(t: &mut Tokenizer<'a>, statement: &'static str) -> Result<&'a str, SceneError> {
    t.next().ok_or(SceneError::UnexpectedEnd {
        statement,
        line: t.line(),
    })
}

fn num(t: &mut Tokenizer<'_>, statement: &'static str) -> Result<f64, SceneError> {
    let token = need(t, statement)?;
    token.parse().map_err(|_| SceneError::BadNumber {
        statement,
        line: t.line(),
        token: token.to_string(),
    })
}

fn int(t: &mut Tokenizer<'_>, statement: &'static str) -> Result<i64, SceneError> {
    Ok(num(t, statement)? as i64)
}

fn vec3(t: &mut Tokenizer<'_>, statement: &'static str) -> Result<Vec3, SceneError> {
    Ok(Vec3::new(
        num(t, statement)?,
        num(t, statement)?,
        num(t, statement)?,
    ))
}

/// Consume tokens up to and including `end`; tolerates running off the
/// text, since a missing terminator should not cascade.
fn skip_until(t: &mut Tokenizer<'_>, end: &str) {
    while let Some(token) = t.next() {
        if token.eq_ignore_ascii_case(end) {
            return;
        }
    }
}

// ---------------------------------------------------------------------
// trainset state
// ---------------------------------------------------------------------

#[derive(Debug)]
struct TrainSet {
    name: String,
    track: String,
    /// Running placement offset along the track, consumed front to back.
    distance: f64,
    velocity: f64,
    count: usize,
    previous: Option<NodeId>,
    /// Coupling read with the previous vehicle; links it to the next one.
    previous_coupling: u32,
    driver: Option<NodeId>,
    timetable_sent: bool,
}

// ---------------------------------------------------------------------
// the loader
// ---------------------------------------------------------------------

struct SceneLoader {
    world: World,
    meta: SceneMeta,
    alpha_suffixes: Vec<String>,
    origin: Vec3,
    origin_stack: Vec<Vec3>,
    rotate: Vec3,
    trainset: Option<TrainSet>,
    textures: HashMap<String, TextureId>,
    next_texture: u32,
    init_done: bool,
}

impl SceneLoader {
    fn new(config: LoaderConfig) -> Self {
        Self {
            world: World::new(config.world),
            meta: SceneMeta::default(),
            alpha_suffixes: config.alpha_suffixes,
            origin: Vec3::ZERO,
            origin_stack: Vec::new(),
            rotate: Vec3::ZERO,
            trainset: None,
            textures: HashMap::new(),
            next_texture: 1,
            init_done: false,
        }
    }

    /// Active rotation then origin offset, as authored coordinates expect.
    fn place(&self, p: Vec3) -> Vec3 {
        p.rotated_y(self.rotate.y) + self.origin
    }

    /// Intern a texture name; returns the id and whether the name marks an
    /// alpha-channel texture.
    fn intern_texture(&mut self, name: &str) -> (TextureId, bool) {
        if name.is_empty() || name == "none" {
            return (TextureId::NONE, false);
        }
        let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
        let alpha = self.alpha_suffixes.iter().any(|s| stem.ends_with(s.as_str()));
        let id = *self.textures.entry(name.to_string()).or_insert_with(|| {
            let id = TextureId(self.next_texture);
            self.next_texture += 1;
            id
        });
        (id, alpha)
    }

    fn run_first_init(&mut self) {
        if self.init_done {
            debug!("first init already done, skipping");
            return;
        }
        self.init_done = true;
        self.world.first_init();
    }

    // -----------------------------------------------------------------
    // main statement loop
    // -----------------------------------------------------------------

    fn load(mut self, text: &str) -> Result<LoadedScene, SceneError> {
        let mut t = Tokenizer::new(text);
        while let Some(token) = t.next() {
            let cmd = token.to_ascii_lowercase();
            match cmd.as_str() {
                "node" => self.parse_node(&mut t)?,
                "trainset" => self.parse_trainset(&mut t)?,
                "endtrainset" => self.end_trainset(),
                "event" => self.parse_event(&mut t)?,
                "rotate" => {
                    self.rotate = vec3(&mut t, "rotate")?;
                }
                "origin" => {
                    if self.origin_stack.len() >= ORIGIN_STACK_LIMIT {
                        return Err(SceneError::OriginOverflow { line: t.line() });
                    }
                    let offset = vec3(&mut t, "origin")?;
                    self.origin += offset;
                    self.origin_stack.push(offset);
                }
                "endorigin" => {
                    let Some(offset) = self.origin_stack.pop() else {
                        return Err(SceneError::OriginUnderflow { line: t.line() });
                    };
                    self.origin -= offset;
                }
                "atmo" => self.parse_atmo(&mut t)?,
                "time" => self.parse_time(&mut t)?,
                "light" => self.parse_light(&mut t)?,
                "camera" => self.parse_camera(&mut t)?,
                "sky" => {
                    self.meta.sky = need(&mut t, "sky")?.to_string();
                    skip_until(&mut t, "endsky");
                }
                "firstinit" => self.run_first_init(),
                "description" => {
                    let mut text = String::new();
                    while let Some(token) = t.next() {
                        if token.eq_ignore_ascii_case("enddescription") {
                            break;
                        }
                        if !text.is_empty() {
                            text.push(' ');
                        }
                        text.push_str(token);
                    }
                    self.meta.description = text;
                }
                "test" => {
                    info!("parser test start");
                    while let Some(token) = t.next() {
                        if token.eq_ignore_ascii_case("endtest") {
                            break;
                        }
                        info!(token, "parser test");
                    }
                }
                "config" => self.parse_inline_config(&mut t)?,
                _ => {
                    // Legacy tolerance: a non-numeric unknown command skips
                    // to its synthesized end token; a number is a real error.
                    if token.len() > 2 && token.parse::<f64>().is_err() {
                        warn!(command = token, "unrecognized command, skipping block");
                        skip_until(&mut t, &format!("end{cmd}"));
                    } else {
                        error!(command = token, "unrecognized command");
                    }
                }
            }
        }
        if !self.init_done {
            self.run_first_init();
        }
        Ok(LoadedScene {
            world: self.world,
            meta: self.meta,
        })
    }

    // -----------------------------------------------------------------
    // node statements
    // -----------------------------------------------------------------

    fn parse_node(&mut self, t: &mut Tokenizer<'_>) -> Result<(), SceneError> {
        let radius = num(t, "node")?;
        let min_radius = num(t, "node")?;
        let name = need(t, "node")?.to_string();
        let type_token = need(t, "node")?.to_ascii_lowercase();
        match type_token.as_str() {
            "triangles" => self.parse_geometry(t, &name, radius, min_radius, Primitive::Triangles),
            "triangle_strip" => {
                self.parse_geometry(t, &name, radius, min_radius, Primitive::TriangleStrip)
            }
            "triangle_fan" => {
                self.parse_geometry(t, &name, radius, min_radius, Primitive::TriangleFan)
            }
            "lines" => self.parse_lines(t, &name, radius, min_radius, Primitive::Lines),
            "line_strip" => self.parse_lines(t, &name, radius, min_radius, Primitive::LineStrip),
            "line_loop" => self.parse_lines(t, &name, radius, min_radius, Primitive::LineLoop),
            "track" => self.parse_track(t, &name, radius, min_radius),
            "traction" => self.parse_traction(t, &name, radius, min_radius),
            "tractionpowersource" => self.parse_power_source(t, &name, radius, min_radius),
            "model" => self.parse_model(t, &name, radius, min_radius),
            "sound" => self.parse_sound(t, &name, radius, min_radius),
            "memcell" => self.parse_memcell(t, &name, radius, min_radius),
            "eventlauncher" => self.parse_launcher(t, &name, radius, min_radius),
            "dynamic" => self.parse_dynamic(t, &name),
            _ => {
                error!(kind = %type_token, name = %name, "unrecognized node type, skipping");
                skip_until(t, &format!("end{type_token}"));
                Ok(())
            }
        }
    }

    fn parse_geometry(
        &mut self,
        t: &mut Tokenizer<'_>,
        name: &str,
        radius: f64,
        min_radius: f64,
        primitive: Primitive,
    ) -> Result<(), SceneError> {
        let mut g = Geometry::new(primitive, TextureId::NONE);
        let mut token = need(t, "triangles")?.to_string();
        if token == "material" {
            loop {
                let key = need(t, "material")?;
                if key.eq_ignore_ascii_case("endmaterial") {
                    break;
                }
                let slot = match key {
                    "ambient:" => Some(&mut g.ambient),
                    "diffuse:" => Some(&mut g.diffuse),
                    "specular:" => Some(&mut g.specular),
                    _ => None,
                };
                match slot {
                    Some(slot) => {
                        for channel in slot.iter_mut() {
                            *channel = num(t, "material")? as f32;
                        }
                    }
                    None => error!(key, "bad material entry"),
                }
            }
            token = need(t, "triangles")?.to_string();
        }
        let (texture, alpha) = self.intern_texture(&token);
        g.texture = texture;
        let flags = if alpha {
            render_flags::ALPHA
        } else {
            render_flags::OPAQUE
        };
        loop {
            let first = need(t, "triangles")?;
            if first.eq_ignore_ascii_case("endtri") {
                break;
            }
            let x: f64 = first.parse().map_err(|_| SceneError::BadNumber {
                statement: "triangles",
                line: t.line(),
                token: first.to_string(),
            })?;
            let point = Vec3::new(x, num(t, "triangles")?, num(t, "triangles")?);
            let normal = vec3(t, "triangles")?;
            let u = num(t, "triangles")?;
            let v = num(t, "triangles")?;
            g.vertices.push(Vertex {
                point: self.place(point),
                normal: normal.rotated_y(self.rotate.y),
                u,
                v,
            });
        }
        // Authored radius widens by the actual spread around the centroid.
        let centroid = g.centroid();
        let spread = g
            .vertices
            .iter()
            .map(|v| v.point.distance_squared(centroid))
            .fold(0.0, f64::max);
        let mut node =
            WorldNode::new(name, centroid, NodePayload::Geometry(g)).with_radius(radius, min_radius);
        node.radius_sq += spread;
        node.flags = flags;
        self.world.add_node(node);
        Ok(())
    }

    fn parse_lines(
        &mut self,
        t: &mut Tokenizer<'_>,
        name: &str,
        radius: f64,
        min_radius: f64,
        primitive: Primitive,
    ) -> Result<(), SceneError> {
        let mut g = Geometry::new(primitive, TextureId::NONE);
        for channel in g.diffuse.iter_mut() {
            *channel = num(t, "lines")? as f32;
        }
        g.line_width = num(t, "lines")?;
        loop {
            let first = need(t, "lines")?;
            if first.eq_ignore_ascii_case("endline") {
                break;
            }
            let x: f64 = first.parse().map_err(|_| SceneError::BadNumber {
                statement: "lines",
                line: t.line(),
                token: first.to_string(),
            })?;
            let point = Vec3::new(x, num(t, "lines")?, num(t, "lines")?);
            g.vertices.push(Vertex {
                point: self.place(point),
                ..Default::default()
            });
        }
        let centroid = g.centroid();
        let node =
            WorldNode::new(name, centroid, NodePayload::Geometry(g)).with_radius(radius, min_radius);
        self.world.add_node(node);
        Ok(())
    }

    /// Cubic bezier midpoint; zero control vectors mean a straight segment.
    fn segment_midpoint(p1: Vec3, c1: Vec3, c2: Vec3, p2: Vec3) -> Vec3 {
        if c1 == Vec3::ZERO && c2 == Vec3::ZERO {
            (p1 + p2) * 0.5
        } else {
            p1 * 0.125 + c1 * 0.375 + c2 * 0.375 + p2 * 0.125
        }
    }

    /// One trajectory block: endpoints with rolls, control points, radius.
    fn parse_segment(
        &mut self,
        t: &mut Tokenizer<'_>,
    ) -> Result<(Vec3, Vec3, Vec3), SceneError> {
        let p1 = self.place(vec3(t, "track")?);
        let _roll1 = num(t, "track")?;
        let c1 = vec3(t, "track")?;
        let c2 = vec3(t, "track")?;
        let p2 = self.place(vec3(t, "track")?);
        let _roll2 = num(t, "track")?;
        let _radius = num(t, "track")?;
        let c1 = if c1 == Vec3::ZERO { c1 } else { self.place(c1) };
        let c2 = if c2 == Vec3::ZERO { c2 } else { self.place(c2) };
        let mid = Self::segment_midpoint(p1, c1, c2, p2);
        Ok((p1, mid, p2))
    }

    fn parse_track(
        &mut self,
        t: &mut Tokenizer<'_>,
        name: &str,
        radius: f64,
        min_radius: f64,
    ) -> Result<(), SceneError> {
        let type_token = need(t, "track")?.to_ascii_lowercase();
        let (kind, category) = match type_token.as_str() {
            "normal" => (TrackKind::Normal, CATEGORY_RAIL),
            "switch" => (TrackKind::Switch, CATEGORY_RAIL),
            "turn" => (TrackKind::Table, CATEGORY_RAIL),
            "cross" => (TrackKind::Cross, CATEGORY_RAIL),
            "road" => (TrackKind::Normal, CATEGORY_ROAD),
            "river" => (TrackKind::Normal, CATEGORY_RIVER),
            "tributary" => (TrackKind::Tributary, CATEGORY_RIVER),
            other => {
                error!(kind = other, name, "unknown track type, skipping");
                skip_until(t, "endtrack");
                return Ok(());
            }
        };
        let _length = num(t, "track")?;
        let _width = num(t, "track")?;
        let friction = num(t, "track")?;
        let _sound_distance = num(t, "track")?;
        let _quality = int(t, "track")?;
        let _damage = int(t, "track")?;
        let _environment = need(t, "track")?;
        let visible = need(t, "track")?.eq_ignore_ascii_case("vis");
        let mut texture1 = TextureId::NONE;
        let mut texture2 = TextureId::NONE;
        if visible {
            texture1 = self.intern_texture(need(t, "track")?).0;
            let _tex_length = num(t, "track")?;
            texture2 = self.intern_texture(need(t, "track")?).0;
            let _tex_height = num(t, "track")?;
            let _tex_width = num(t, "track")?;
            let _tex_slope = num(t, "track")?;
        }
        let (p1, mid, p2) = self.parse_segment(t)?;
        let mut track = Track::new(kind, p1, mid, p2);
        track.category_flags = category;
        track.friction = friction;
        track.texture1 = texture1;
        track.texture2 = texture2;
        if matches!(kind, TrackKind::Switch | TrackKind::Cross) {
            let (p3, _mid, p4) = self.parse_segment(t)?;
            track.switch = Some(SwitchExtension {
                point3: p3,
                point4: p4,
                ..Default::default()
            });
        }
        loop {
            let token = need(t, "track")?.to_ascii_lowercase();
            match token.as_str() {
                "endtrack" => break,
                "event0" => track.events.event0_name = need(t, "track")?.to_string(),
                "event1" => track.events.event1_name = need(t, "track")?.to_string(),
                "event2" => track.events.event2_name = need(t, "track")?.to_string(),
                "eventall0" => track.events.eventall0_name = need(t, "track")?.to_string(),
                "eventall1" => track.events.eventall1_name = need(t, "track")?.to_string(),
                "eventall2" => track.events.eventall2_name = need(t, "track")?.to_string(),
                "isolated" => track.isolated_name = need(t, "track")?.to_string(),
                "velocity" => {
                    let v = num(t, "track")?;
                    track.velocity = v;
                    if let Some(sw) = &mut track.switch {
                        sw.velocity_cap = v;
                    }
                }
                "overhead" => track.overhead = num(t, "track")?,
                other => debug!(attribute = other, name, "skipping track attribute"),
            }
        }
        let center = track.center();
        let node = WorldNode::new(name, center, NodePayload::Track(track))
            .with_radius(radius, min_radius);
        self.world.add_node(node);
        Ok(())
    }

    fn parse_traction(
        &mut self,
        t: &mut Tokenizer<'_>,
        name: &str,
        radius: f64,
        min_radius: f64,
    ) -> Result<(), SceneError> {
        let power_name = need(t, "traction")?.to_string();
        let nominal_voltage = num(t, "traction")?;
        let _max_current = num(t, "traction")?;
        let mut resistivity = num(t, "traction")?;
        if resistivity == 0.01 {
            // Legacy scenery default in ohm/km; substitute the measured value.
            resistivity = 0.075;
        }
        resistivity *= 0.001;
        let material = match need(t, "traction")? {
            "none" => WireMaterial::None,
            "al" => WireMaterial::Aluminum,
            _ => WireMaterial::Copper,
        };
        let wire_thickness = num(t, "traction")?;
        let damage_flag = int(t, "traction")? as u32;
        let p1 = self.place(vec3(t, "traction")?);
        let p2 = self.place(vec3(t, "traction")?);
        let _p3 = self.place(vec3(t, "traction")?);
        let _p4 = self.place(vec3(t, "traction")?);
        let _min_height = num(t, "traction")?;
        let section_length = num(t, "traction")?;
        let num_wires = int(t, "traction")? as u32;
        let wire_offset = num(t, "traction")?;
        let visible = need(t, "traction")?.eq_ignore_ascii_case("vis");

        let mut span = TractionSpan::new(p1, p2);
        span.power_name = if power_name == "none" { String::new() } else { power_name };
        span.material = material;
        span.resistivity = resistivity;
        span.wire_thickness = wire_thickness;
        span.damage_flag = damage_flag;
        span.num_sections = if section_length > 0.0 {
            (span.length() / section_length) as u32
        } else {
            0
        };
        span.num_wires = num_wires;
        span.wire_offset = wire_offset;
        let _ = nominal_voltage;

        let mut token = need(t, "traction")?.to_string();
        if token == "parallel" {
            span.parallel_name = need(t, "traction")?.to_string();
            token = need(t, "traction")?.to_string();
        }
        if !token.eq_ignore_ascii_case("endtraction") {
            error!(name, found = %token, "endtraction delimiter missing");
            skip_until(t, "endtraction");
        }
        let center = span.center();
        let mut node = WorldNode::new(name, center, NodePayload::Traction(span))
            .with_radius(radius, min_radius);
        node.visible = visible;
        self.world.add_node(node);
        Ok(())
    }

    fn parse_power_source(
        &mut self,
        t: &mut Tokenizer<'_>,
        name: &str,
        radius: f64,
        min_radius: f64,
    ) -> Result<(), SceneError> {
        let center = self.place(vec3(t, "tractionpowersource")?);
        let nominal_voltage = num(t, "tractionpowersource")?;
        let max_current = num(t, "tractionpowersource")?;
        let internal_resistance = num(t, "tractionpowersource")?;
        let mut source = PowerSource::new(nominal_voltage, max_current, internal_resistance);
        while let Some(token) = t.next() {
            if token.eq_ignore_ascii_case("end") {
                break;
            }
            if token.eq_ignore_ascii_case("section") {
                source.is_section = true;
            }
        }
        let node = WorldNode::new(name, center, NodePayload::PowerSource(source))
            .with_radius(radius, min_radius);
        self.world.add_node(node);
        Ok(())
    }

    fn parse_model(
        &mut self,
        t: &mut Tokenizer<'_>,
        name: &str,
        radius: f64,
        min_radius: f64,
    ) -> Result<(), SceneError> {
        let center = self.place(vec3(t, "model")?);
        let angle = num(t, "model")?;
        let path = need(t, "model")?.to_string();
        let mut model = Model::new(&path, angle + self.rotate.y);
        let mut opaque = true;
        loop {
            let token = need(t, "model")?;
            if token.eq_ignore_ascii_case("endmodel") {
                break;
            }
            if token.eq_ignore_ascii_case("lights") {
                let mut slot = 0usize;
                while let Some(next) = t.peek()
                    && let Ok(state) = next.parse::<f64>()
                {
                    t.next();
                    model.set_light(slot, state);
                    slot += 1;
                }
            } else if self.intern_texture(token).1 {
                // Replaceable-skin textures decide the render pass.
                opaque = false;
            }
        }
        let terrain = min_radius < 0.0;
        let payload = if terrain {
            NodePayload::Terrain(model)
        } else {
            NodePayload::Model(model)
        };
        let mut node = WorldNode::new(name, center, payload)
            .with_radius(radius, if terrain { 0.0 } else { min_radius });
        node.flags = if opaque {
            render_flags::OPAQUE
        } else {
            render_flags::OPAQUE | render_flags::ALPHA
        };
        self.world.add_node(node);
        Ok(())
    }

    fn parse_sound(
        &mut self,
        t: &mut Tokenizer<'_>,
        name: &str,
        radius: f64,
        min_radius: f64,
    ) -> Result<(), SceneError> {
        let center = self.place(vec3(t, "sound")?);
        let sample = need(t, "sound")?.to_string();
        let terminator = need(t, "sound")?;
        if !terminator.eq_ignore_ascii_case("endsound") {
            skip_until(t, "endsound");
        }
        let node = WorldNode::new(
            name,
            center,
            NodePayload::Sound(SoundEmitter::new(&sample)),
        )
        .with_radius(radius, min_radius.max(0.0));
        self.world.add_node(node);
        Ok(())
    }

    fn parse_memcell(
        &mut self,
        t: &mut Tokenizer<'_>,
        name: &str,
        radius: f64,
        min_radius: f64,
    ) -> Result<(), SceneError> {
        let center = self.place(vec3(t, "memcell")?);
        let text = need(t, "memcell")?.replace('_', " ");
        let value1 = num(t, "memcell")?;
        let value2 = num(t, "memcell")?;
        let track = need(t, "memcell")?;
        let mut cell = MemoryCell::new(&text, value1, value2);
        if track != "none" {
            cell.attached_track_name = track.to_string();
        }
        let terminator = need(t, "memcell")?;
        if !terminator.eq_ignore_ascii_case("endmemcell") {
            skip_until(t, "endmemcell");
        }
        let node = WorldNode::new(name, center, NodePayload::MemoryCell(cell))
            .with_radius(radius, min_radius);
        self.world.add_node(node);
        Ok(())
    }

    fn parse_launcher(
        &mut self,
        t: &mut Tokenizer<'_>,
        name: &str,
        _radius: f64,
        min_radius: f64,
    ) -> Result<(), SceneError> {
        let center = self.place(vec3(t, "eventlauncher")?);
        let radius = num(t, "eventlauncher")?;
        let mut launcher = EventLauncher::new(radius);
        let key = need(t, "eventlauncher")?;
        if key != "none" {
            launcher.key = if key.len() == 1 {
                key.bytes().next().map(|b| b.to_ascii_uppercase())
            } else {
                key.parse::<u8>().ok()
            };
        }
        launcher.set_interval(num(t, "eventlauncher")?);
        launcher.event1_name = need(t, "eventlauncher")?.to_string();
        let second = need(t, "eventlauncher")?.to_string();
        let mut token = if second == "end" || second == "condition" {
            second
        } else {
            launcher.event2_name = second;
            need(t, "eventlauncher")?.to_string()
        };
        if token == "condition" {
            launcher.cell_name = need(t, "eventlauncher")?.to_string();
            let text = need(t, "eventlauncher")?;
            if text != "*" {
                launcher.check_mask |= flags::CONDITIONAL_MEM_STRING;
                launcher.check_text = text.replace('_', " ");
            }
            let v1 = need(t, "eventlauncher")?;
            if v1 != "*" {
                launcher.check_mask |= flags::CONDITIONAL_MEM_VAL1;
                launcher.check_value1 = v1.parse().unwrap_or(0.0);
            }
            let v2 = need(t, "eventlauncher")?;
            if v2 != "*" {
                launcher.check_mask |= flags::CONDITIONAL_MEM_VAL2;
                launcher.check_value2 = v2.parse().unwrap_or(0.0);
            }
            token = need(t, "eventlauncher")?.to_string();
        }
        if !token.eq_ignore_ascii_case("end") && !token.eq_ignore_ascii_case("endeventlauncher") {
            skip_until(t, "end");
        }
        let node = WorldNode::new(name, center, NodePayload::Launcher(launcher))
            .with_radius(-1.0, min_radius);
        self.world.add_node(node);
        Ok(())
    }

    // -----------------------------------------------------------------
    // vehicles and trainsets
    // -----------------------------------------------------------------

    fn parse_trainset(&mut self, t: &mut Tokenizer<'_>) -> Result<(), SceneError> {
        let name = need(t, "trainset")?.to_string();
        let track = need(t, "trainset")?.to_string();
        let distance = num(t, "trainset")?;
        let velocity = num(t, "trainset")?;
        self.trainset = Some(TrainSet {
            name: if name == "none" { String::new() } else { name },
            track,
            distance,
            velocity,
            count: 0,
            previous: None,
            previous_coupling: 0,
            driver: None,
            timetable_sent: false,
        });
        Ok(())
    }

    fn end_trainset(&mut self) {
        if let Some(ts) = self.trainset.take()
            && !ts.timetable_sent
        {
            Self::send_timetable(&mut self.world, &ts);
        }
    }

    fn send_timetable(world: &mut World, ts: &TrainSet) {
        let Some(driver) = ts.driver else {
            return;
        };
        if let Some(v) = world.nodes.get_mut(driver).and_then(|n| n.as_vehicle_mut()) {
            let location = v.position;
            v.put_command(CellCommand {
                text: format!("Timetable:{}", ts.name),
                value1: ts.velocity,
                value2: 0.0,
                location,
            });
        }
    }

    /// Coupling token: integer, optionally `<int>.<load params>`. Negative
    /// couplings are depot-locked.
    fn parse_coupling(token: &str) -> u32 {
        let int_part = token.split_once('.').map(|(i, _)| i).unwrap_or(token);
        let value: i64 = int_part.parse().unwrap_or(0);
        if value < 0 {
            (-value) as u32 | COUPLING_LOCKED
        } else {
            value as u32
        }
    }

    fn parse_dynamic(&mut self, t: &mut Tokenizer<'_>, name: &str) -> Result<(), SceneError> {
        let folder = need(t, "dynamic")?.to_string();
        let _skin = need(t, "dynamic")?;
        let mmd = need(t, "dynamic")?.to_string();

        let in_trainset = self.trainset.is_some();
        let (track_name, offset, driver_type, velocity, coupling) = if in_trainset {
            let offset = num(t, "dynamic")?;
            let driver_type = need(t, "dynamic")?.to_string();
            let coupling = Self::parse_coupling(need(t, "dynamic")?);
            let ts = self.trainset.as_ref().ok_or(SceneError::UnexpectedEnd {
                statement: "dynamic",
                line: t.line(),
            })?;
            (ts.track.clone(), offset, driver_type, ts.velocity, coupling)
        } else {
            let track = need(t, "dynamic")?.to_string();
            let offset = num(t, "dynamic")?;
            let driver_type = need(t, "dynamic")?.to_string();
            let velocity = num(t, "dynamic")?;
            (track, offset, driver_type, velocity, 3)
        };

        let load_count = num(t, "dynamic")?;
        let mut load_type = String::new();
        let mut load = load_count;
        let mut trailing = if load_count > 0.0 {
            let token = need(t, "dynamic")?.to_string();
            if token.eq_ignore_ascii_case("enddynamic") {
                // Load amount without a type does not count as load.
                load = 0.0;
                Some(token)
            } else {
                load_type = token;
                None
            }
        } else {
            None
        };

        let track_id = self.world.nodes.find(NameClass::Track, &track_name);
        let placed = match track_id {
            Some(track_id) => {
                self.place_vehicle(
                    name,
                    &folder,
                    &mmd,
                    track_id,
                    offset,
                    &driver_type,
                    velocity,
                    coupling,
                    load,
                    &load_type,
                )
            }
            None => {
                error!(track = %track_name, vehicle = name, "missed track, dropping vehicle");
                None
            }
        };

        let token = match trailing.take() {
            Some(token) => token,
            None => need(t, "dynamic")?.to_string(),
        };
        let token = if token.eq_ignore_ascii_case("destination") {
            let destination = need(t, "dynamic")?.to_string();
            if let Some(id) = placed
                && let Some(v) = self.world.nodes.get_mut(id).and_then(|n| n.as_vehicle_mut())
            {
                v.destination = destination;
            }
            need(t, "dynamic")?.to_string()
        } else {
            token
        };
        if !token.eq_ignore_ascii_case("enddynamic") {
            error!(vehicle = name, "enddynamic statement missing");
            skip_until(t, "enddynamic");
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn place_vehicle(
        &mut self,
        name: &str,
        folder: &str,
        mmd: &str,
        track_id: NodeId,
        offset: f64,
        driver_type: &str,
        velocity: f64,
        coupling: u32,
        load: f64,
        load_type: &str,
    ) -> Option<NodeId> {
        let (p1, p2, has_event0) = {
            let track = self.world.nodes.get(track_id)?.as_track()?;
            (
                track.point1,
                track.point2,
                !track.events.event0_name.is_empty(),
            )
        };
        let reversed = offset == -1.0;
        let dir = (p2 - p1).normalized();

        if let Some(ts) = &mut self.trainset {
            // A standing consist on an event track spawns clear of the event.
            if ts.count == 0
                && has_event0
                && ts.velocity.abs() <= 1.0
                && (0.0..EVENT_TRACK_LEAD_SHIFT).contains(&ts.distance)
            {
                ts.distance = EVENT_TRACK_LEAD_SHIFT;
            }
        }
        let shift = match &self.trainset {
            Some(ts) => {
                if reversed {
                    ts.distance
                } else {
                    ts.distance - offset
                }
            }
            None => {
                if reversed {
                    0.0
                } else {
                    offset.max(0.0)
                }
            }
        };
        let position = p1 + dir * shift;
        let heading = if reversed { -dir } else { dir };

        let mut vehicle = Vehicle::new(position, heading);
        vehicle.track = Some(track_id);
        vehicle.velocity = velocity / 3.6;
        vehicle.type_name = format!("{folder}/{mmd}");
        vehicle.has_driver = driver_type != "nobody";
        vehicle.is_head_driver = driver_type.eq_ignore_ascii_case("headdriver");
        vehicle.load = load;
        vehicle.load_type = load_type.to_string();
        vehicle.direction = if reversed { -1.0 } else { 1.0 };
        if let Some(ts) = &self.trainset {
            vehicle.train_name = ts.name.clone();
            vehicle.coupling_flags = coupling;
        }

        let id = self
            .world
            .add_node(WorldNode::new(name, position, NodePayload::Vehicle(vehicle)));
        if let Ok(pair) = self.world.nodes.get_pair_mut(track_id, id)
            && let (Some(track), Some(node)) = (pair.0.as_track_mut(), Some(pair.1))
            && let Err(err) = track.add_vehicle(&node.name.clone(), id)
        {
            warn!(%err, "vehicle not registered on track");
        }

        if let Some(ts) = &mut self.trainset {
            let prev = ts.previous;
            let prev_coupling = ts.previous_coupling;
            ts.count += 1;
            ts.distance -= VEHICLE_SPACING;
            ts.previous = Some(id);
            ts.previous_coupling = coupling;
            if ts.driver.is_none() && driver_type.eq_ignore_ascii_case("headdriver") {
                ts.driver = Some(id);
            }
            // An authored inter-coupler gap beyond tolerance breaks the
            // linkage to the previous vehicle.
            let gap_ok = offset == -1.0 || offset.abs() <= COUPLER_GAP_LIMIT;
            if let Some(prev) = prev
                && prev_coupling != 0
                && gap_ok
            {
                if let Some(v) = self.world.nodes.get_mut(prev).and_then(|n| n.as_vehicle_mut()) {
                    v.coupled_next = Some(id);
                }
                if let Some(v) = self.world.nodes.get_mut(id).and_then(|n| n.as_vehicle_mut()) {
                    v.coupled_prev = Some(prev);
                }
            }
            // A zero coupling closes the consist; its timetable goes out now.
            if coupling == 0 && !ts.timetable_sent {
                let ts_copy = self.trainset.take();
                if let Some(mut ts) = ts_copy {
                    Self::send_timetable(&mut self.world, &ts);
                    ts.timetable_sent = true;
                    self.trainset = Some(ts);
                }
            }
        }
        Some(id)
    }

    // -----------------------------------------------------------------
    // events
    // -----------------------------------------------------------------

    fn parse_update_params(
        &mut self,
        t: &mut Tokenizer<'_>,
    ) -> Result<(String, f64, f64, u32), SceneError> {
        let mut mask = 0;
        let mut text = String::new();
        let token = need(t, "event")?;
        if token != "*" {
            mask |= flags::UPDATE_MEM_STRING;
            text = token.replace('_', " ");
        }
        let mut value1 = 0.0;
        let token = need(t, "event")?;
        if token != "*" {
            mask |= flags::UPDATE_MEM_VAL1;
            value1 = token.parse().unwrap_or(0.0);
        }
        let mut value2 = 0.0;
        let token = need(t, "event")?;
        if token != "*" {
            mask |= flags::UPDATE_MEM_VAL2;
            value2 = token.parse().unwrap_or(0.0);
        }
        Ok((text, value1, value2, mask))
    }

    fn parse_event(&mut self, t: &mut Tokenizer<'_>) -> Result<(), SceneError> {
        let name = need(t, "event")?.to_string();
        let type_token = need(t, "event")?.to_ascii_lowercase();
        let delay = num(t, "event")?;
        let mut condition_mask = 0u32;
        let target;
        let action = match type_token.as_str() {
            "updatevalues" => {
                target = need(t, "event")?.to_string();
                let (text, value1, value2, mask) = self.parse_update_params(t)?;
                EventAction::UpdateValues {
                    cell: NodeRef::named(&target),
                    text,
                    value1,
                    value2,
                    mask,
                }
            }
            "addvalues" => {
                target = need(t, "event")?.to_string();
                let (text, value1, value2, mask) = self.parse_update_params(t)?;
                EventAction::AddValues {
                    cell: NodeRef::named(&target),
                    text,
                    value1,
                    value2,
                    mask: mask | flags::UPDATE_MEM_ADD,
                }
            }
            "copyvalues" => {
                target = need(t, "event")?.to_string();
                let source = need(t, "event")?.to_string();
                let mask = match t.peek().and_then(|p| p.parse::<u32>().ok()) {
                    Some(mask) => {
                        t.next();
                        mask
                    }
                    None => {
                        flags::UPDATE_MEM_STRING | flags::UPDATE_MEM_VAL1 | flags::UPDATE_MEM_VAL2
                    }
                };
                EventAction::CopyValues {
                    target: NodeRef::named(&target),
                    source: NodeRef::named(&source),
                    mask,
                }
            }
            "getvalues" => {
                target = need(t, "event")?.to_string();
                EventAction::GetValues {
                    cell: NodeRef::named(&target),
                }
            }
            "putvalues" => {
                target = String::new();
                let location = self.place(vec3(t, "event")?);
                let text = need(t, "event")?.replace('_', " ");
                let value1 = num(t, "event")?;
                let value2 = num(t, "event")?;
                EventAction::PutValues {
                    text,
                    value1,
                    value2,
                    location,
                }
            }
            "whois" => {
                target = need(t, "event")?.to_string();
                let mask = match t.peek().and_then(|p| p.parse::<u32>().ok()) {
                    Some(mask) => {
                        t.next();
                        mask
                    }
                    None => 0,
                };
                EventAction::WhoIs {
                    cell: NodeRef::named(&target),
                    mask,
                }
            }
            "logvalues" => {
                target = need(t, "event")?.to_string();
                EventAction::LogValues {
                    cell: if target == "none" {
                        None
                    } else {
                        Some(NodeRef::named(&target))
                    },
                }
            }
            "multiple" => {
                target = need(t, "event")?.to_string();
                let mut children = Vec::new();
                let mut else_polarity = false;
                loop {
                    let Some(token) = t.peek() else { break };
                    if token.eq_ignore_ascii_case("endevent")
                        || token.eq_ignore_ascii_case("condition")
                        || token.eq_ignore_ascii_case("randomdelay")
                    {
                        break;
                    }
                    t.next();
                    if token.eq_ignore_ascii_case("else") {
                        else_polarity = !else_polarity;
                        continue;
                    }
                    if else_polarity {
                        condition_mask |= flags::CONDITIONAL_ELSE << children.len();
                    }
                    children.push(EventRef::named(token));
                }
                EventAction::Multiple { children }
            }
            "animation" => {
                target = need(t, "event")?.to_string();
                let channel_token = need(t, "event")?.to_ascii_lowercase();
                let channel = match channel_token.as_str() {
                    "rotate" => AnimationChannel::Rotate,
                    "translate" => AnimationChannel::Translate,
                    _ => AnimationChannel::Digital,
                };
                let submodel = need(t, "event")?.to_string();
                let mut params = [0.0; 4];
                let count = if channel == AnimationChannel::Digital { 1 } else { 4 };
                for slot in params.iter_mut().take(count) {
                    *slot = num(t, "event")?;
                }
                EventAction::Animation {
                    model: NodeRef::named(&target),
                    channel,
                    submodel,
                    params,
                }
            }
            "lights" => {
                target = need(t, "event")?.to_string();
                let mut states = Vec::new();
                while let Some(next) = t.peek()
                    && let Ok(state) = next.parse::<f64>()
                {
                    t.next();
                    states.push(state);
                }
                EventAction::Lights {
                    model: NodeRef::named(&target),
                    states,
                }
            }
            "visible" => {
                target = need(t, "event")?.to_string();
                EventAction::Visible {
                    target: NodeRef::named(&target),
                    on: int(t, "event")? != 0,
                }
            }
            "switch" => {
                target = need(t, "event")?.to_string();
                let state = int(t, "event")? as u8;
                let mut move_rate = -1.0;
                let mut move_delay = -1.0;
                if let Some(next) = t.peek()
                    && let Ok(rate) = next.parse::<f64>()
                {
                    t.next();
                    move_rate = rate;
                    if let Some(next) = t.peek()
                        && let Ok(delay) = next.parse::<f64>()
                    {
                        t.next();
                        move_delay = delay;
                    }
                }
                EventAction::Switch {
                    track: NodeRef::named(&target),
                    state,
                    move_rate,
                    move_delay,
                }
            }
            "trackvel" => {
                target = need(t, "event")?.to_string();
                EventAction::TrackVel {
                    track: NodeRef::named(&target),
                    velocity: num(t, "event")?,
                }
            }
            "dynvel" => {
                target = need(t, "event")?.to_string();
                EventAction::DynVel {
                    velocity: num(t, "event")?,
                }
            }
            "sound" => {
                target = need(t, "event")?.to_string();
                EventAction::Sound {
                    emitter: NodeRef::named(&target),
                    action: int(t, "event")? as i32,
                }
            }
            "voltage" => {
                target = need(t, "event")?.to_string();
                EventAction::Voltage {
                    source: NodeRef::named(&target),
                    voltage: num(t, "event")?,
                }
            }
            "friction" => {
                target = need(t, "event")?.to_string();
                EventAction::Friction {
                    value: num(t, "event")?,
                }
            }
            "message" => {
                target = need(t, "event")?.to_string();
                EventAction::Message {
                    text: target.replace('_', " "),
                }
            }
            "exit" => {
                target = need(t, "event")?.to_string();
                EventAction::Exit {
                    text: target.replace('_', " "),
                }
            }
            other => {
                error!(kind = other, name = %name, "unimplemented event type");
                skip_until(t, "endevent");
                let mut ev = Event::new(&name, EventAction::Ignored);
                ev.delay = delay;
                self.register_event(ev);
                return Ok(());
            }
        };

        let mut ev = Event::new(&name, action);
        ev.delay = delay;
        ev.condition.mask = condition_mask;
        loop {
            let token = need(t, "event")?.to_ascii_lowercase();
            match token.as_str() {
                "endevent" => break,
                "randomdelay" => ev.random_delay = num(t, "event")?,
                "condition" => self.parse_event_condition(t, &mut ev, &target)?,
                other => debug!(token = other, name = %name, "skipping event token"),
            }
        }
        self.register_event(ev);
        Ok(())
    }

    fn parse_event_condition(
        &mut self,
        t: &mut Tokenizer<'_>,
        ev: &mut Event,
        target: &str,
    ) -> Result<(), SceneError> {
        let kind = need(t, "event")?.to_ascii_lowercase();
        match kind.as_str() {
            "trackoccupied" => {
                ev.condition.mask |= flags::CONDITIONAL_TRACK_OCCUPIED;
                ev.condition.track = NodeRef::named(target);
            }
            "trackfree" => {
                ev.condition.mask |= flags::CONDITIONAL_TRACK_FREE;
                ev.condition.track = NodeRef::named(target);
            }
            // The legacy spelling is kept alongside the correct one.
            "propability" | "probability" => {
                ev.condition.mask |= flags::CONDITIONAL_PROBABILITY;
                ev.condition.probability = num(t, "event")?;
            }
            "memcompare" => {
                ev.condition.mask |= flags::CONDITIONAL_MEM_COMPARE;
                ev.condition.cell = NodeRef::named(target);
                let text = need(t, "event")?;
                if text != "*" {
                    ev.condition.mask |= flags::CONDITIONAL_MEM_STRING;
                    ev.condition.text = text.replace('_', " ");
                }
                let v1 = need(t, "event")?;
                if v1 != "*" {
                    ev.condition.mask |= flags::CONDITIONAL_MEM_VAL1;
                    ev.condition.value1 = v1.parse().unwrap_or(0.0);
                }
                let v2 = need(t, "event")?;
                if v2 != "*" {
                    ev.condition.mask |= flags::CONDITIONAL_MEM_VAL2;
                    ev.condition.value2 = v2.parse().unwrap_or(0.0);
                }
            }
            other => warn!(condition = other, event = %ev.name, "unknown condition kind"),
        }
        Ok(())
    }

    /// Duplicate policy: configured prefixes and suffixes drop silently;
    /// otherwise the newcomer joins the original's chain, and with
    /// `join_events` off the original is additionally degraded to inert.
    fn register_event(&mut self, ev: Event) {
        let config = &self.world.ctx.config;
        if let Some(head) = self.world.events.find(&ev.name) {
            let suppressed = config
                .suppress_duplicate_prefixes
                .iter()
                .any(|p| ev.name.starts_with(p.as_str()))
                || config
                    .suppress_duplicate_suffixes
                    .iter()
                    .any(|s| ev.name.ends_with(s.as_str()));
            if suppressed {
                debug!(name = %ev.name, "duplicate event suppressed");
                return;
            }
            if !config.join_events {
                warn!(name = %ev.name, "duplicated event");
                if let Some(original) = self.world.events.get_mut(head) {
                    original.ignore();
                }
            }
            let id = self.world.events.insert_unindexed(ev);
            self.world.events.join(head, id);
        } else {
            self.world.add_event(ev);
        }
    }

    // -----------------------------------------------------------------
    // presentation statements
    // -----------------------------------------------------------------

    fn parse_atmo(&mut self, t: &mut Tokenizer<'_>) -> Result<(), SceneError> {
        info!("scenery atmo definition");
        for channel in self.meta.atmo_color.iter_mut() {
            *channel = num(t, "atmo")?;
        }
        self.meta.fog_start = num(t, "atmo")?;
        self.meta.fog_end = num(t, "atmo")?;
        if self.meta.fog_end > 0.0 {
            for channel in self.meta.fog_color.iter_mut() {
                *channel = num(t, "atmo")?;
            }
        }
        skip_until(t, "endatmo");
        Ok(())
    }

    fn parse_clock(token: &str) -> (u32, u32) {
        let (h, m) = token.split_once(':').unwrap_or((token, "0"));
        (h.parse().unwrap_or(0), m.parse().unwrap_or(0))
    }

    fn parse_time(&mut self, t: &mut Tokenizer<'_>) -> Result<(), SceneError> {
        info!("scenery time definition");
        let (hour, minute) = Self::parse_clock(need(t, "time")?);
        self.world.ctx.clock.set_time_of_day(hour, minute);
        self.meta.sunrise = Self::parse_clock(need(t, "time")?);
        self.meta.sunset = Self::parse_clock(need(t, "time")?);
        skip_until(t, "endtime");
        Ok(())
    }

    fn parse_light(&mut self, t: &mut Tokenizer<'_>) -> Result<(), SceneError> {
        info!("scenery light definition");
        self.meta.light_direction = vec3(t, "light")?.normalized();
        for slot in [
            &mut self.meta.ambient,
            &mut self.meta.diffuse,
            &mut self.meta.specular,
        ] {
            for channel in slot.iter_mut() {
                *channel = num(t, "light")?;
            }
        }
        skip_until(t, "endlight");
        Ok(())
    }

    fn parse_camera(&mut self, t: &mut Tokenizer<'_>) -> Result<(), SceneError> {
        let mut values = Vec::new();
        while let Some(token) = t.next() {
            if token.eq_ignore_ascii_case("endcamera") {
                break;
            }
            values.push(token.parse::<f64>().unwrap_or(0.0));
        }
        let mut camera = CameraInit {
            index: self.meta.cameras.len() as i32,
            ..Default::default()
        };
        let slots: [&mut f64; 6] = [
            &mut camera.position.x,
            &mut camera.position.y,
            &mut camera.position.z,
            &mut camera.angles_deg.x,
            &mut camera.angles_deg.y,
            &mut camera.angles_deg.z,
        ];
        for (slot, value) in slots.into_iter().zip(values.iter()) {
            *slot = *value;
        }
        if let Some(index) = values.get(6) {
            if *index >= 0.0 {
                camera.index = *index as i32;
            }
        }
        self.meta.cameras.push(camera);
        Ok(())
    }

    fn parse_inline_config(&mut self, t: &mut Tokenizer<'_>) -> Result<(), SceneError> {
        let config = &mut self.world.ctx.config;
        loop {
            let Some(key) = t.next() else { break };
            let key = key.to_ascii_lowercase();
            match key.as_str() {
                "endconfig" => break,
                "joinduplicatedevents" => {
                    config.join_events = need(t, "config")?.eq_ignore_ascii_case("yes");
                }
                "hiddenevents" => config.hidden_events = int(t, "config")? as u32,
                "livetraction" => {
                    config.live_traction = need(t, "config")?.eq_ignore_ascii_case("yes");
                }
                "enabletraction" => {
                    config.enable_traction = need(t, "config")?.eq_ignore_ascii_case("yes");
                }
                "friction" => {
                    let friction = num(t, "config")?;
                    config.friction = friction;
                    self.world.ctx.friction = friction;
                }
                other => {
                    debug!(key = other, "skipping config entry");
                    t.next();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railworld_core::node::NodeKind;

    fn load(text: &str) -> LoadedScene {
        load_str(text, LoaderConfig::default()).unwrap()
    }

    const TRACK_STMT: &str = "node -1 0 t1 track normal 100 1.435 1.0 50 0 0 flat vis \
        rail_screw 4 tpd-new 0.2 1.0 1.1 \
        0 0 0 0.0  0 0 0  0 0 0  100 0 0 0.0  0 \
        velocity 80 isolated iso1 event1 sem_w5 endtrack";

    // ---- 1. origin and rotate -------------------------------------------

    #[test]
    fn origin_stack_offsets_and_restores() {
        let scene = load(
            "origin 100 0 200 \
             origin 10 0 20 \
             node -1 0 c1 memcell 1 2 3 test 0 0 none endmemcell \
             endorigin \
             node -1 0 c2 memcell 1 2 3 test 0 0 none endmemcell \
             endorigin",
        );
        let c1 = scene.world.nodes.find(NameClass::MemoryCell, "c1").unwrap();
        let c2 = scene.world.nodes.find(NameClass::MemoryCell, "c2").unwrap();
        let n1 = scene.world.nodes.get(c1).unwrap();
        let n2 = scene.world.nodes.get(c2).unwrap();
        assert_eq!(n1.center, Vec3::new(111.0, 2.0, 223.0));
        assert_eq!(n2.center, Vec3::new(101.0, 2.0, 203.0));
    }

    #[test]
    fn origin_underflow_is_fatal() {
        let err = load_str("endorigin", LoaderConfig::default());
        assert!(matches!(err, Err(SceneError::OriginUnderflow { .. })));
    }

    #[test]
    fn rotate_turns_node_positions() {
        let scene = load(
            "rotate 0 90 0 \
             node -1 0 c1 memcell 1 0 0 test 0 0 none endmemcell",
        );
        let id = scene.world.nodes.find(NameClass::MemoryCell, "c1").unwrap();
        let center = scene.world.nodes.get(id).unwrap().center;
        assert!((center.x - 0.0).abs() < 1e-9);
        assert!((center.z + 1.0).abs() < 1e-9);
    }

    // ---- 2. node statements ---------------------------------------------

    #[test]
    fn track_statement_full_roundtrip() {
        let scene = load(TRACK_STMT);
        let id = scene.world.nodes.find(NameClass::Track, "t1").unwrap();
        let track = scene.world.nodes.get(id).unwrap().as_track().unwrap();
        assert_eq!(track.kind, TrackKind::Normal);
        assert_eq!(track.velocity, 80.0);
        assert_eq!(track.isolated_name, "iso1");
        assert_eq!(track.events.event1_name, "sem_w5");
        assert_eq!(track.point2, Vec3::new(100.0, 0.0, 0.0));
        assert!(track.texture1.is_some());
    }

    #[test]
    fn duplicate_memcell_keeps_the_second() {
        let scene = load(
            "node -1 0 cell1 memcell 0 0 0 first 1 0 none endmemcell \
             node -1 0 cell1 memcell 0 0 0 second 2 0 none endmemcell",
        );
        let id = scene.world.nodes.find(NameClass::MemoryCell, "cell1").unwrap();
        let cell = scene.world.nodes.get(id).unwrap().as_memcell().unwrap();
        assert_eq!(cell.text(), "second");
        assert_eq!(scene.world.nodes.count_of(NodeKind::MemoryCell), 2);
    }

    #[test]
    fn launcher_condition_statement() {
        let scene = load(
            "node -1 0 w1 eventlauncher 10 0 20 50 none -60 ev1 none condition cellA test * 5 end",
        );
        let id = scene.world.nodes.ids_of(NodeKind::Launcher)[0];
        let launcher = scene.world.nodes.get(id).unwrap().as_launcher().unwrap();
        assert_eq!(launcher.delta_time, 60.0);
        assert_eq!(launcher.cell_name, "cellA");
        assert_eq!(
            launcher.check_mask,
            flags::CONDITIONAL_MEM_STRING | flags::CONDITIONAL_MEM_VAL2
        );
        assert_eq!(launcher.check_value2, 5.0);
        assert_eq!(launcher.radius_sq, 2500.0);
    }

    #[test]
    fn traction_statement_parses_span() {
        let scene = load(
            "node -1 0 none traction sub1 3000 2500 0.01 cu 0.00735 0 \
             0 5.5 0  100 5.5 0  0 6.5 0  100 6.5 0 \
             1.0 25 2 0.2 vis parallel other endtraction",
        );
        let id = scene.world.nodes.ids_of(NodeKind::Traction)[0];
        let span = scene.world.nodes.get(id).unwrap().as_traction().unwrap();
        assert_eq!(span.power_name, "sub1");
        assert_eq!(span.parallel_name, "other");
        // The legacy 0.01 ohm/km default is corrected and converted to ohm/m.
        assert!((span.resistivity - 0.075e-3).abs() < 1e-12);
        assert_eq!(span.num_sections, 4);
    }

    #[test]
    fn unknown_command_skips_to_end_token() {
        let scene = load(
            "frobnicate 1 2 3 endfrobnicate \
             node -1 0 c1 memcell 0 0 0 x 0 0 none endmemcell",
        );
        assert!(scene.world.nodes.find(NameClass::MemoryCell, "c1").is_some());
    }

    // ---- 3. events -------------------------------------------------------

    #[test]
    fn event_duplicate_degrades_original_without_join() {
        let scene = load(
            "event sem_a updatevalues 0 cell1 a * * endevent \
             event sem_a updatevalues 0 cell1 b * * endevent",
        );
        let head = scene.world.events.find("sem_a").unwrap();
        let original = scene.world.events.get(head).unwrap();
        assert_eq!(original.action, EventAction::Ignored);
        assert!(original.joined.is_some());
    }

    #[test]
    fn event_duplicate_joins_when_configured() {
        let mut config = LoaderConfig::default();
        config.world.join_events = true;
        let scene = load_str(
            "node -1 0 cell1 memcell 0 0 0 x 0 0 none endmemcell \
             event sem_a updatevalues 0 cell1 a * * endevent \
             event sem_a updatevalues 0 cell1 b * * endevent",
            config,
        )
        .unwrap();
        let head = scene.world.events.find("sem_a").unwrap();
        let original = scene.world.events.get(head).unwrap();
        assert_ne!(original.action, EventAction::Ignored);
        assert!(original.joined.is_some());
    }

    #[test]
    fn hash_prefixed_duplicate_drops_silently() {
        let scene = load(
            "event #shunt updatevalues 0 cell1 a * * endevent \
             event #shunt updatevalues 0 cell1 b * * endevent",
        );
        let head = scene.world.events.find("#shunt").unwrap();
        assert!(scene.world.events.get(head).unwrap().joined.is_none());
    }

    #[test]
    fn multiple_event_with_else_children() {
        let scene = load(&format!(
            "{TRACK_STMT} \
             event choice multiple 0 t1 ev_a ev_b else ev_c condition trackoccupied endevent"
        ));
        let id = scene.world.events.find("choice").unwrap();
        let ev = scene.world.events.get(id).unwrap();
        let EventAction::Multiple { children } = &ev.action else {
            panic!("expected multiple");
        };
        assert_eq!(children.len(), 3);
        assert_eq!(children[2].name, "ev_c");
        assert_ne!(ev.condition.mask & flags::CONDITIONAL_TRACK_OCCUPIED, 0);
        assert_ne!(ev.condition.mask & (flags::CONDITIONAL_ELSE << 2), 0);
        assert_eq!(ev.condition.mask & (flags::CONDITIONAL_ELSE << 1), 0);
        assert_eq!(ev.condition.track.name, "t1");
    }

    #[test]
    fn update_params_wildcards_build_mask() {
        let scene = load(
            "node -1 0 cellX memcell 0 0 0 x 0 0 none endmemcell \
             event up updatevalues 1.5 cellX SetVelocity * 40 endevent",
        );
        let id = scene.world.events.find("up").unwrap();
        let ev = scene.world.events.get(id).unwrap();
        assert_eq!(ev.delay, 1.5);
        let EventAction::UpdateValues { text, value2, mask, .. } = &ev.action else {
            panic!("expected updatevalues");
        };
        assert_eq!(text, "SetVelocity");
        assert_eq!(*value2, 40.0);
        assert_eq!(*mask, flags::UPDATE_MEM_STRING | flags::UPDATE_MEM_VAL2);
    }

    // ---- 4. trainsets ----------------------------------------------------

    #[test]
    fn trainset_couples_vehicles_and_sends_timetable() {
        let scene = load(&format!(
            "{TRACK_STMT} \
             trainset ros1 t1 10 0 \
             node -1 0 loco dynamic pkp/et22 none et22 0 headdriver 3 0 enddynamic \
             node -1 0 car1 dynamic pkp/111a none 111a 0 nobody 1 0 enddynamic \
             node -1 0 car2 dynamic pkp/111a none 111a 0 nobody 0 0 enddynamic \
             endtrainset"
        ));
        let loco = scene.world.nodes.find(NameClass::Vehicle, "loco").unwrap();
        let car1 = scene.world.nodes.find(NameClass::Vehicle, "car1").unwrap();
        let v_loco = scene.world.nodes.get(loco).unwrap().as_vehicle().unwrap();
        let v_car1 = scene.world.nodes.get(car1).unwrap().as_vehicle().unwrap();
        assert_eq!(v_loco.coupled_next, Some(car1));
        assert_eq!(v_car1.coupled_prev, Some(loco));
        assert!(v_loco.is_head_driver);
        assert_eq!(v_loco.commands.len(), 1);
        assert_eq!(v_loco.commands[0].text, "Timetable:ros1");
        let track = scene
            .world
            .nodes
            .find(NameClass::Track, "t1")
            .and_then(|id| scene.world.nodes.get(id))
            .unwrap()
            .as_track()
            .unwrap();
        assert_eq!(track.occupants.len(), 3);
    }

    #[test]
    fn oversized_coupler_gap_drops_linkage() {
        let scene = load(&format!(
            "{TRACK_STMT} \
             trainset none t1 10 0 \
             node -1 0 a dynamic pkp/et22 none et22 0 headdriver 3 0 enddynamic \
             node -1 0 b dynamic pkp/111a none 111a 2.0 nobody 1 0 enddynamic \
             endtrainset"
        ));
        let a = scene.world.nodes.find(NameClass::Vehicle, "a").unwrap();
        let v = scene.world.nodes.get(a).unwrap().as_vehicle().unwrap();
        assert_eq!(v.coupled_next, None);
    }

    // ---- 5. presentation statements -------------------------------------

    #[test]
    fn time_and_sky_statements() {
        let scene = load("time 10:30 6:00 20:00 endtime sky cl_001.t3d endsky");
        assert_eq!(scene.world.ctx.clock.hour(), 10);
        assert_eq!(scene.world.ctx.clock.minute(), 30);
        assert_eq!(scene.meta.sunset, (20, 0));
        assert_eq!(scene.meta.sky, "cl_001.t3d");
    }

    #[test]
    fn inline_config_flips_flags() {
        let scene = load("config joinduplicatedevents yes hiddenevents 1 endconfig");
        assert!(scene.world.ctx.config.join_events);
        assert_eq!(scene.world.ctx.config.hidden_events, 1);
    }
}
