//! Consolidated terrain-geometry export.
//!
//! Gathers every kilometer square's plain triangle geometry into one
//! document, grouped by square then by texture. The loader writes it out
//! once after load when the scene referenced a terrain container with no
//! baked model yet, so later runs can load the bake instead of
//! re-merging the soup each start.

use serde::Serialize;
use tracing::debug;

use crate::id::TextureId;
use crate::node::{NodeKind, Vertex};
use crate::world::World;

/// One texture's triangle soup within a square.
#[derive(Debug, Serialize)]
pub struct TextureGroup {
    pub texture: TextureId,
    pub vertices: Vec<Vertex>,
}

/// All exported geometry of one kilometer square.
#[derive(Debug, Serialize)]
pub struct SquareGeometry {
    pub column: i32,
    pub row: i32,
    pub groups: Vec<TextureGroup>,
}

/// The export document.
#[derive(Debug, Default, Serialize)]
pub struct TerrainExport {
    pub squares: Vec<SquareGeometry>,
}

impl TerrainExport {
    pub fn is_empty(&self) -> bool {
        self.squares.is_empty()
    }
}

/// Collect the square-level triangle geometry of the whole world.
///
/// Untextured geometry is skipped. Squares and groups come out sorted,
/// so the bake is deterministic for a given scene.
pub fn collect(world: &World) -> TerrainExport {
    let mut squares = Vec::new();
    for ((column, row), square) in world.grid.squares() {
        let mut groups: Vec<TextureGroup> = Vec::new();
        let mut cursor = square.nodes;
        while let Some(id) = cursor {
            let Some(node) = world.nodes.get(id) else {
                break;
            };
            cursor = node.next_in_sector;
            if node.kind() != NodeKind::Triangles {
                continue;
            }
            let Some(g) = node.as_geometry() else {
                continue;
            };
            if !g.texture.is_some() {
                continue;
            }
            match groups.iter_mut().find(|run| run.texture == g.texture) {
                Some(run) => run.vertices.extend_from_slice(&g.vertices),
                None => groups.push(TextureGroup {
                    texture: g.texture,
                    vertices: g.vertices.clone(),
                }),
            }
        }
        if groups.is_empty() {
            continue;
        }
        groups.sort_by_key(|g| g.texture);
        squares.push(SquareGeometry {
            column,
            row,
            groups,
        });
    }
    squares.sort_by_key(|s| (s.column, s.row));
    debug!(squares = squares.len(), "terrain geometry collected");
    TerrainExport { squares }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::node::{Geometry, NodePayload, Primitive, WorldNode, DEFAULT_RADIUS_SQ};
    use crate::test_utils::*;
    use crate::world::World;

    fn ground_patch(world: &mut World, texture: u32, at: Vec3) {
        let mut g = Geometry::new(Primitive::Triangles, TextureId(texture));
        g.vertices = vec![
            Vertex {
                point: at,
                ..Default::default()
            },
            Vertex {
                point: at + Vec3::new(30.0, 0.0, 0.0),
                ..Default::default()
            },
            Vertex {
                point: at + Vec3::new(0.0, 0.0, 30.0),
                ..Default::default()
            },
        ];
        let mut node = WorldNode::new(
            "",
            at + Vec3::new(10.0, 0.0, 10.0),
            NodePayload::Geometry(g),
        );
        node.radius_sq = DEFAULT_RADIUS_SQ;
        world.add_node(node);
    }

    #[test]
    fn collect_groups_by_square_then_texture() {
        let mut world = empty_world();
        ground_patch(&mut world, 2, Vec3::new(10.0, 0.0, 10.0));
        ground_patch(&mut world, 1, Vec3::new(100.0, 0.0, 100.0));
        ground_patch(&mut world, 2, Vec3::new(200.0, 0.0, 200.0));
        ground_patch(&mut world, 3, Vec3::new(1500.0, 0.0, 10.0));

        let doc = collect(&world);
        assert_eq!(doc.squares.len(), 2);
        let first = &doc.squares[0];
        assert_eq!(first.groups.len(), 2);
        assert_eq!(first.groups[0].texture, TextureId(1));
        assert_eq!(first.groups[0].vertices.len(), 3);
        assert_eq!(first.groups[1].texture, TextureId(2));
        assert_eq!(first.groups[1].vertices.len(), 6);
        assert_eq!(doc.squares[1].groups[0].texture, TextureId(3));
        assert!(doc.squares[0].column < doc.squares[1].column);
    }

    #[test]
    fn untextured_geometry_never_exports() {
        let mut world = empty_world();
        ground_patch(&mut world, 0, Vec3::new(10.0, 0.0, 10.0));
        assert!(collect(&world).is_empty());
    }
}
