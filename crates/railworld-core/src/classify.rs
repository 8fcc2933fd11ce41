//! Render classification: routing nodes onto sector render lists and
//! merging texture runs into mesh aggregates.
//!
//! Placement happens once, after load. Each node lands either in the
//! sector under its center or, for large plain opaque triangles and
//! terrain patches, directly in a kilometer square. Groupable nodes wait
//! on the pending list until the sector sort coalesces same-texture runs
//! into synthetic mesh nodes.

use tracing::warn;

use crate::context::WorldConfig;
use crate::grid::{CacheState, RenderClass, SpatialGrid};
use crate::id::{NodeId, SectorCoord, TextureId};
use crate::node::{
    MeshAggregate, NodeKind, NodePayload, SyntheticSource, WorldNode, render_flags,
    DEFAULT_RADIUS_SQ, MESH_RADIUS_SQ,
};
use crate::registry::NodeRegistry;

/// Where a node belongs after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Sector(RenderClass),
    /// Sector node list only, no render list (memory cells, power sources).
    Unlisted,
    /// Kilometer-square node list (large plain opaque triangles).
    Square,
    /// Square addressed by the 3+3 digit code in the node name.
    SquareByCode,
    /// The catch-all sector (global launchers).
    Global(RenderClass),
    /// Not grid-resident at all (vehicles live on the dynamics list).
    Skip,
}

/// A model carrying both opaque and alpha materials sits on the solo
/// opaque list and is drawn again in the alpha pass.
pub fn is_double_render(node: &WorldNode) -> bool {
    matches!(node.kind(), NodeKind::Model | NodeKind::Terrain)
        && node.flags & render_flags::MODEL_OPAQUE_ANY != 0
        && node.flags & render_flags::MODEL_ALPHA_ANY != 0
}

fn classify(node: &WorldNode, registry: &NodeRegistry) -> Placement {
    match node.kind() {
        NodeKind::Sound => Placement::Sector(RenderClass::Hidden),
        NodeKind::Launcher => {
            let global = node.as_launcher().map(|l| l.is_global()).unwrap_or(false);
            if global {
                Placement::Global(RenderClass::Hidden)
            } else {
                Placement::Sector(RenderClass::Hidden)
            }
        }
        NodeKind::MemoryCell | NodeKind::PowerSource => Placement::Unlisted,
        NodeKind::Vehicle => Placement::Skip,
        NodeKind::Traction | NodeKind::Lines | NodeKind::LineStrip | NodeKind::LineLoop => {
            Placement::Sector(RenderClass::Wires)
        }
        NodeKind::Track => {
            let groupable = node.as_track().map(|t| t.is_groupable()).unwrap_or(false);
            if groupable && node.grouping_texture().is_some() {
                Placement::Sector(RenderClass::Pending)
            } else {
                Placement::Sector(RenderClass::SoloOpaque)
            }
        }
        NodeKind::DummyTrack => {
            let groupable = match &node.payload {
                NodePayload::DummyTrack { track, .. } => registry
                    .get(*track)
                    .and_then(|n| n.as_track())
                    .map(|t| t.is_groupable())
                    .unwrap_or(false),
                _ => false,
            };
            if groupable && node.grouping_texture().is_some() {
                Placement::Sector(RenderClass::Pending)
            } else {
                Placement::Sector(RenderClass::SoloOpaque)
            }
        }
        NodeKind::Triangles | NodeKind::TriangleStrip | NodeKind::TriangleFan => {
            if node.flags & render_flags::ALPHA != 0 {
                Placement::Sector(RenderClass::Alpha)
            } else if node.kind() == NodeKind::Triangles
                && node.min_radius_sq == 0.0
                && node.radius_sq >= DEFAULT_RADIUS_SQ
            {
                Placement::Square
            } else if node.grouping_texture().is_some() {
                Placement::Sector(RenderClass::Pending)
            } else {
                Placement::Sector(RenderClass::Opaque)
            }
        }
        NodeKind::Model | NodeKind::Terrain => {
            if node.flags & render_flags::MODEL_OPAQUE_ANY == 0
                && node.flags & render_flags::MODEL_ALPHA_ANY != 0
            {
                Placement::Sector(RenderClass::Alpha)
            } else {
                Placement::Sector(RenderClass::SoloOpaque)
            }
        }
        NodeKind::TerrainPatch => Placement::SquareByCode,
        NodeKind::Mesh => Placement::Sector(RenderClass::Opaque),
    }
}

fn thread_sector_list(registry: &mut NodeRegistry, head: &mut Option<NodeId>, id: NodeId) {
    if let Some(node) = registry.get_mut(id) {
        node.next_in_sector = *head;
        *head = Some(id);
    }
}

fn thread_render_list(registry: &mut NodeRegistry, head: &mut Option<NodeId>, id: NodeId) {
    if let Some(node) = registry.get_mut(id) {
        node.next_render = *head;
        *head = Some(id);
    }
}

/// Decode the square code from a terrain-patch name: six digits, column
/// code times 1000 plus row code, both offset so 500 is the world center.
pub fn terrain_square_code(name: &str) -> Option<(i32, i32)> {
    let code: i32 = name.parse().ok()?;
    if !(0..1_000_000).contains(&code) {
        return None;
    }
    Some((code / 1000, code % 1000))
}

/// Place one node on the grid per its classification. Tracks with two
/// distinct textures get a synthetic shadow node for the second channel,
/// placed alongside.
pub fn add_node(
    registry: &mut NodeRegistry,
    grid: &mut SpatialGrid,
    config: &WorldConfig,
    id: NodeId,
) {
    let Some(node) = registry.get(id) else {
        return;
    };
    let placement = classify(node, registry);
    let center = node.center;
    let name = node.name.clone();

    // Second texture channel of a grouped track renders through a shadow.
    let shadow = match node.as_track() {
        Some(t) if t.texture2.is_some() && t.texture2 != t.texture1 => {
            Some((t.texture2, node.radius_sq))
        }
        _ => None,
    };

    match placement {
        Placement::Skip => return,
        Placement::Global(class) => {
            let mut head = grid.global.nodes;
            thread_sector_list(registry, &mut head, id);
            grid.global.nodes = head;
            grid.global.node_count += 1;
            let mut rhead = grid.global.render[class.index()];
            thread_render_list(registry, &mut rhead, id);
            grid.global.render[class.index()] = rhead;
        }
        Placement::Square => {
            let coord = grid.sector_of(center);
            if let Some(square) = grid.square_mut(coord) {
                let mut head = square.nodes;
                thread_sector_list(registry, &mut head, id);
                if let Some(square) = grid.square_mut(coord) {
                    square.nodes = head;
                    square.node_count += 1;
                }
            }
        }
        Placement::SquareByCode => {
            let Some((code_col, code_row)) = terrain_square_code(&name) else {
                warn!(name = %name, "terrain patch name does not encode a square");
                return;
            };
            let half = config.squares_per_side as i32 / 2;
            let col = code_col - 500 + half;
            let row = code_row - 500 + half;
            if let Some(square) = grid.square_by_code_mut(col, row) {
                let mut head = square.nodes;
                thread_sector_list(registry, &mut head, id);
                if let Some(square) = grid.square_by_code_mut(col, row) {
                    square.nodes = head;
                    square.node_count += 1;
                }
            } else {
                warn!(name = %name, "terrain patch square out of bounds");
            }
        }
        Placement::Sector(_) | Placement::Unlisted => {
            let coord = grid.sector_of(center);
            place_in_sector(registry, grid, coord, id, placement);
        }
    }

    if let Some((texture, radius_sq)) = shadow {
        let mut dummy = WorldNode::new(
            "",
            center,
            NodePayload::DummyTrack { track: id, texture },
        )
        .synthetic(SyntheticSource::DummyTrack);
        dummy.radius_sq = radius_sq;
        let dummy_id = registry.insert(dummy, config);
        let coord = grid.sector_of(center);
        let placement = registry
            .get(dummy_id)
            .map(|n| classify(n, registry))
            .unwrap_or(Placement::Skip);
        place_in_sector(registry, grid, coord, dummy_id, placement);
    }
}

fn place_in_sector(
    registry: &mut NodeRegistry,
    grid: &mut SpatialGrid,
    coord: SectorCoord,
    id: NodeId,
    placement: Placement,
) {
    let Some(sector) = grid.sector_mut(coord) else {
        // Edge of the world: the node exists but is never rendered.
        return;
    };
    let mut head = sector.nodes;
    let mut render = sector.render;
    thread_sector_list(registry, &mut head, id);
    if let Placement::Sector(class) = placement {
        thread_render_list(registry, &mut render[class.index()], id);
    }
    if let Some(sector) = grid.sector_mut(coord) {
        sector.nodes = head;
        sector.render = render;
        sector.node_count += 1;
        if let Some(node) = registry.get(id)
            && node.kind() == NodeKind::Track
        {
            sector.tracks.push(id);
        }
        sector.cache = CacheState::Unchecked;
    }
}

/// Sort one sector: order the pending list by texture, coalesce runs of
/// two or more into a synthetic mesh per texture, rebuild the compact
/// track array. Idempotent when nothing was added since the last sort.
pub fn sort_sector(
    registry: &mut NodeRegistry,
    grid: &mut SpatialGrid,
    config: &WorldConfig,
    coord: SectorCoord,
) {
    let Some(sector) = grid.fast_sector(coord) else {
        return;
    };

    // Drain the pending list into a stable texture ordering.
    let mut pending = Vec::new();
    let mut cursor = sector.render_head(RenderClass::Pending);
    while let Some(id) = cursor {
        cursor = registry.get(id).and_then(|n| n.next_render);
        pending.push(id);
    }
    // List order is newest-first; restore insertion order before sorting
    // so equal-texture runs keep load order.
    pending.reverse();
    pending.sort_by_key(|id| {
        registry
            .get(*id)
            .map(|n| n.grouping_texture())
            .unwrap_or(TextureId::NONE)
    });

    let mut opaque_add: Vec<NodeId> = Vec::new();
    let mut meshed_add: Vec<NodeId> = Vec::new();
    let sector_center = pending
        .first()
        .and_then(|id| registry.get(*id))
        .map(|n| n.center)
        .unwrap_or_default();

    let mut i = 0;
    while i < pending.len() {
        let texture = registry
            .get(pending[i])
            .map(|n| n.grouping_texture())
            .unwrap_or(TextureId::NONE);
        let mut j = i + 1;
        while j < pending.len()
            && registry
                .get(pending[j])
                .map(|n| n.grouping_texture())
                == Some(texture)
        {
            j += 1;
        }
        if j - i > 1 && texture.is_some() {
            let members = pending[i..j].to_vec();
            let mut mesh = WorldNode::new(
                "",
                sector_center,
                NodePayload::Mesh(MeshAggregate {
                    texture,
                    members: members.clone(),
                }),
            )
            .synthetic(SyntheticSource::MeshMerge);
            mesh.radius_sq = MESH_RADIUS_SQ;
            mesh.flags |= render_flags::OPAQUE;
            let mesh_id = registry.insert(mesh, config);
            opaque_add.push(mesh_id);
            meshed_add.extend(members);
        } else {
            opaque_add.extend(&pending[i..j]);
        }
        i = j;
    }

    let Some(sector) = grid.fast_sector_mut(coord) else {
        return;
    };
    sector.render[RenderClass::Pending.index()] = None;
    let mut opaque_head = sector.render[RenderClass::Opaque.index()];
    let mut meshed_head = sector.render[RenderClass::Meshed.index()];
    let mut nodes_head = sector.nodes;
    let mut nodes_added = 0;
    for id in opaque_add {
        thread_render_list(registry, &mut opaque_head, id);
        // Synthetic meshes also join the sector node list.
        if let Some(node) = registry.get(id)
            && node.kind() == NodeKind::Mesh
        {
            thread_sector_list(registry, &mut nodes_head, id);
            nodes_added += 1;
        }
    }
    for id in meshed_add {
        thread_render_list(registry, &mut meshed_head, id);
    }
    let Some(sector) = grid.fast_sector_mut(coord) else {
        return;
    };
    sector.render[RenderClass::Opaque.index()] = opaque_head;
    sector.render[RenderClass::Meshed.index()] = meshed_head;
    sector.nodes = nodes_head;
    sector.node_count += nodes_added;

    // Rebuild the compact track array from the node list.
    let mut tracks = Vec::new();
    let mut cursor = sector.nodes;
    while let Some(id) = cursor {
        let node = registry.get(id);
        cursor = node.and_then(|n| n.next_in_sector);
        if let Some(node) = node
            && node.kind() == NodeKind::Track
        {
            tracks.push(id);
        }
    }
    tracks.reverse();
    let Some(sector) = grid.fast_sector_mut(coord) else {
        return;
    };
    sector.tracks = tracks;
    sector.cache = CacheState::Unchecked;
}

/// Sort every materialized sector.
pub fn sort_all(registry: &mut NodeRegistry, grid: &mut SpatialGrid, config: &WorldConfig) {
    for coord in grid.sector_coords() {
        sort_sector(registry, grid, config, coord);
    }
}
