//! World nodes: the tagged entity representing every placeable object.
//!
//! A node pairs common placement/render state with exactly one live
//! payload variant ([`NodePayload`]), discriminated by [`NodeKind`]. Nodes
//! live in the registry arena and thread through up to three independent
//! index-linked lists: the per-kind global list, the per-sector node list,
//! and one render-class list per sector pass.

use serde::{Deserialize, Serialize};

use crate::id::{NodeId, TextureId};
use crate::math::Vec3;
use crate::memcell::MemoryCell;
use crate::model::{Model, SoundEmitter, TerrainPatch};
use crate::track::Track;
use crate::traction::{PowerSource, TractionSpan};
use crate::vehicle::Vehicle;

/// Render-intent flag bits. Geometry gets exactly one of opaque/alpha;
/// model flags accumulate the bits of every material used.
pub mod render_flags {
    /// Node has opaque material.
    pub const OPAQUE: u32 = 0x10;
    /// Node has alpha-blended material.
    pub const ALPHA: u32 = 0x20;

    /// Model mask: no bit set means no alpha materials anywhere, so the
    /// model renders in the opaque pass only.
    pub const MODEL_ALPHA_ANY: u32 = 0x2020_0020;
    /// Model mask: no bit set means no opaque materials anywhere, so the
    /// model renders in the alpha pass only. Models matching both masks
    /// render twice, once per pass, by design.
    pub const MODEL_OPAQUE_ANY: u32 = 0x1010_0010;
}

/// Default far visibility cutoff, squared (authored radius -1).
pub const DEFAULT_RADIUS_SQ: f64 = 10_000.0 * 10_000.0;

/// Far cutoff applied to merged meshes so the aggregate is never culled
/// before its members would be.
pub const MESH_RADIUS_SQ: f64 = 1e8;

/// A single geometry vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex {
    pub point: Vec3,
    pub normal: Vec3,
    pub u: f64,
    pub v: f64,
}

/// Primitive topology of a geometry node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Triangles,
    TriangleStrip,
    TriangleFan,
    Lines,
    LineStrip,
    LineLoop,
}

impl Primitive {
    /// Line-family primitives render on the wires list.
    pub fn is_lines(self) -> bool {
        matches!(
            self,
            Primitive::Lines | Primitive::LineStrip | Primitive::LineLoop
        )
    }
}

/// A geometry payload: raw vertices with one texture and material colors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    pub primitive: Primitive,
    pub vertices: Vec<Vertex>,
    pub texture: TextureId,
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    /// Line width for line-family primitives.
    pub line_width: f64,
}

impl Geometry {
    pub fn new(primitive: Primitive, texture: TextureId) -> Self {
        Self {
            primitive,
            vertices: Vec::new(),
            texture,
            ambient: [1.0; 3],
            diffuse: [1.0; 3],
            specular: [0.0; 3],
            line_width: 1.0,
        }
    }

    /// Centroid of the vertex set.
    pub fn centroid(&self) -> Vec3 {
        if self.vertices.is_empty() {
            return Vec3::ZERO;
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vec3::ZERO, |acc, v| acc + v.point);
        sum / self.vertices.len() as f64
    }
}

/// A synthetic node aggregating a run of same-texture sector geometry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshAggregate {
    pub texture: TextureId,
    /// Member nodes, in sorted-run order.
    pub members: Vec<NodeId>,
}

/// Who created a node and owns freeing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeOrigin {
    /// Authored in the scene file; freed with the registry.
    Authored,
    /// Created by a load-time pass; that pass owns the lifecycle.
    Synthetic(SyntheticSource),
}

/// Which pass created a synthetic node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyntheticSource {
    /// Sector sort: texture-run mesh aggregate.
    MeshMerge,
    /// Triangle divider: fragment of a boundary-crossing triangle.
    TriangleSplit,
    /// Classifier: second-texture shadow of a grouped track.
    DummyTrack,
    /// Topology: substitute for a missing power supply reference.
    PowerFallback,
    /// Topology: memory cell synthesized for an isolated section.
    IsolatedCell,
}

/// The exactly-one-live payload of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodePayload {
    Geometry(Geometry),
    Track(Track),
    /// Shadow of a grouped track for its second texture channel; renders
    /// the same track with the other texture.
    DummyTrack { track: NodeId, texture: TextureId },
    Traction(TractionSpan),
    PowerSource(PowerSource),
    Model(Model),
    /// Container for terrain patches spread over kilometer squares.
    Terrain(Model),
    TerrainPatch(TerrainPatch),
    Sound(SoundEmitter),
    MemoryCell(MemoryCell),
    Launcher(crate::launcher::EventLauncher),
    Vehicle(Vehicle),
    Mesh(MeshAggregate),
}

/// Discriminant of [`NodePayload`], with geometry split by primitive the
/// way the per-kind registries are organized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Triangles,
    TriangleStrip,
    TriangleFan,
    Lines,
    LineStrip,
    LineLoop,
    Track,
    DummyTrack,
    Traction,
    PowerSource,
    Model,
    Terrain,
    TerrainPatch,
    Sound,
    MemoryCell,
    Launcher,
    Vehicle,
    Mesh,
}

impl NodeKind {
    pub const COUNT: usize = 18;

    /// Dense index for per-kind tables.
    pub fn index(self) -> usize {
        match self {
            NodeKind::Triangles => 0,
            NodeKind::TriangleStrip => 1,
            NodeKind::TriangleFan => 2,
            NodeKind::Lines => 3,
            NodeKind::LineStrip => 4,
            NodeKind::LineLoop => 5,
            NodeKind::Track => 6,
            NodeKind::DummyTrack => 7,
            NodeKind::Traction => 8,
            NodeKind::PowerSource => 9,
            NodeKind::Model => 10,
            NodeKind::Terrain => 11,
            NodeKind::TerrainPatch => 12,
            NodeKind::Sound => 13,
            NodeKind::MemoryCell => 14,
            NodeKind::Launcher => 15,
            NodeKind::Vehicle => 16,
            NodeKind::Mesh => 17,
        }
    }
}

impl NodePayload {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodePayload::Geometry(g) => match g.primitive {
                Primitive::Triangles => NodeKind::Triangles,
                Primitive::TriangleStrip => NodeKind::TriangleStrip,
                Primitive::TriangleFan => NodeKind::TriangleFan,
                Primitive::Lines => NodeKind::Lines,
                Primitive::LineStrip => NodeKind::LineStrip,
                Primitive::LineLoop => NodeKind::LineLoop,
            },
            NodePayload::Track(_) => NodeKind::Track,
            NodePayload::DummyTrack { .. } => NodeKind::DummyTrack,
            NodePayload::Traction(_) => NodeKind::Traction,
            NodePayload::PowerSource(_) => NodeKind::PowerSource,
            NodePayload::Model(_) => NodeKind::Model,
            NodePayload::Terrain(_) => NodeKind::Terrain,
            NodePayload::TerrainPatch(_) => NodeKind::TerrainPatch,
            NodePayload::Sound(_) => NodeKind::Sound,
            NodePayload::MemoryCell(_) => NodeKind::MemoryCell,
            NodePayload::Launcher(_) => NodeKind::Launcher,
            NodePayload::Vehicle(_) => NodeKind::Vehicle,
            NodePayload::Mesh(_) => NodeKind::Mesh,
        }
    }
}

/// A world node: placement, render state, list links, payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldNode {
    /// Empty = unnamed, never indexed.
    pub name: String,

    pub center: Vec3,

    /// Far visibility cutoff, squared.
    pub radius_sq: f64,
    /// Near cutoff, squared; nonzero objects vanish close up.
    pub min_radius_sq: f64,

    pub visible: bool,
    pub flags: u32,
    pub origin: NodeOrigin,

    /// Next node of the same kind in the global registry list.
    pub next_of_kind: Option<NodeId>,
    /// Next node in the owning sector's node list.
    pub next_in_sector: Option<NodeId>,
    /// Next node on the same render-class list of the owning sector.
    pub next_render: Option<NodeId>,

    /// Slot in the sector's compiled geometry buffer; `None` until built.
    pub buffer_slot: Option<u32>,
    /// Recompile stamp the slot was built under.
    pub compiled_version: u32,

    pub payload: NodePayload,
}

impl WorldNode {
    pub fn new(name: &str, center: Vec3, payload: NodePayload) -> Self {
        let name = if name == "none" { "" } else { name };
        Self {
            name: name.to_string(),
            center,
            radius_sq: DEFAULT_RADIUS_SQ,
            min_radius_sq: 0.0,
            visible: true,
            flags: 0,
            origin: NodeOrigin::Authored,
            next_of_kind: None,
            next_in_sector: None,
            next_render: None,
            buffer_slot: None,
            compiled_version: 0,
            payload,
        }
    }

    pub fn synthetic(mut self, source: SyntheticSource) -> Self {
        self.origin = NodeOrigin::Synthetic(source);
        self
    }

    /// Authored visibility radius in meters; negative keeps the default.
    pub fn with_radius(mut self, radius: f64, min_radius: f64) -> Self {
        if radius >= 0.0 {
            self.radius_sq = radius * radius;
        }
        if min_radius > 0.0 {
            self.min_radius_sq = min_radius * min_radius;
        }
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    // -- payload accessors ------------------------------------------------

    pub fn as_track(&self) -> Option<&Track> {
        match &self.payload {
            NodePayload::Track(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_track_mut(&mut self) -> Option<&mut Track> {
        match &mut self.payload {
            NodePayload::Track(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_traction(&self) -> Option<&TractionSpan> {
        match &self.payload {
            NodePayload::Traction(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_traction_mut(&mut self) -> Option<&mut TractionSpan> {
        match &mut self.payload {
            NodePayload::Traction(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_power_source(&self) -> Option<&PowerSource> {
        match &self.payload {
            NodePayload::PowerSource(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_power_source_mut(&mut self) -> Option<&mut PowerSource> {
        match &mut self.payload {
            NodePayload::PowerSource(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_memcell(&self) -> Option<&MemoryCell> {
        match &self.payload {
            NodePayload::MemoryCell(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_memcell_mut(&mut self) -> Option<&mut MemoryCell> {
        match &mut self.payload {
            NodePayload::MemoryCell(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match &self.payload {
            NodePayload::Model(m) | NodePayload::Terrain(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_model_mut(&mut self) -> Option<&mut Model> {
        match &mut self.payload {
            NodePayload::Model(m) | NodePayload::Terrain(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry> {
        match &self.payload {
            NodePayload::Geometry(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_geometry_mut(&mut self) -> Option<&mut Geometry> {
        match &mut self.payload {
            NodePayload::Geometry(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_vehicle(&self) -> Option<&Vehicle> {
        match &self.payload {
            NodePayload::Vehicle(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vehicle_mut(&mut self) -> Option<&mut Vehicle> {
        match &mut self.payload {
            NodePayload::Vehicle(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sound_mut(&mut self) -> Option<&mut SoundEmitter> {
        match &mut self.payload {
            NodePayload::Sound(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_launcher(&self) -> Option<&crate::launcher::EventLauncher> {
        match &self.payload {
            NodePayload::Launcher(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_launcher_mut(&mut self) -> Option<&mut crate::launcher::EventLauncher> {
        match &mut self.payload {
            NodePayload::Launcher(l) => Some(l),
            _ => None,
        }
    }

    /// Texture relevant to render grouping: geometry texture, a track's
    /// first channel, or a mesh/dummy node's assigned texture.
    pub fn grouping_texture(&self) -> TextureId {
        match &self.payload {
            NodePayload::Geometry(g) => g.texture,
            NodePayload::Track(t) => t.texture1,
            NodePayload::DummyTrack { texture, .. } => *texture,
            NodePayload::Mesh(m) => m.texture,
            _ => TextureId::NONE,
        }
    }
}
