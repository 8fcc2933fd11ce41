//! Post-load terrain bake.
//!
//! A scene that references a terrain container model in its source form
//! gets the merged square geometry written out once after load; later
//! runs point the container at the bake and skip the merge.

use std::io::Write;

use railworld_core::export;
use railworld_core::node::NodeKind;
use railworld_core::world::World;
use tracing::info;

use crate::error::SceneError;

/// Extension of an already-baked terrain model.
const BAKED_EXTENSION: &str = ".e3d";

/// Whether the loaded world wants a bake: a terrain container exists and
/// its model path is not already a baked file.
pub fn bake_wanted(world: &World) -> bool {
    world.nodes.ids_of(NodeKind::Terrain).into_iter().any(|id| {
        world
            .nodes
            .get(id)
            .and_then(|n| n.as_model())
            .is_some_and(|m| !m.path.ends_with(BAKED_EXTENSION))
    })
}

/// Write the consolidated terrain geometry, grouped by kilometer square
/// then by texture.
pub fn write_bake<W: Write>(world: &World, out: &mut W) -> Result<(), SceneError> {
    let doc = export::collect(world);
    info!(squares = doc.squares.len(), "writing terrain bake");
    let text = ron::ser::to_string_pretty(&doc, ron::ser::PrettyConfig::default())?;
    out.write_all(text.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use railworld_core::math::Vec3;
    use railworld_core::model::Model;
    use railworld_core::node::{NodePayload, WorldNode};
    use railworld_core::test_utils::*;

    fn terrain_container(world: &mut World, path: &str) {
        world.add_node(WorldNode::new(
            "okolice",
            Vec3::ZERO,
            NodePayload::Terrain(Model::new(path, 0.0)),
        ));
    }

    #[test]
    fn bake_wanted_only_for_unbaked_containers() {
        let mut world = empty_world();
        assert!(!bake_wanted(&world));
        terrain_container(&mut world, "models/okolice.t3d");
        assert!(bake_wanted(&world));

        let mut baked = empty_world();
        terrain_container(&mut baked, "models/okolice.e3d");
        assert!(!bake_wanted(&baked));
    }

    #[test]
    fn bake_serializes_collected_squares() {
        let mut world = empty_world();
        terrain_container(&mut world, "models/okolice.t3d");
        let mut g = railworld_core::node::Geometry::new(
            railworld_core::node::Primitive::Triangles,
            railworld_core::id::TextureId(4),
        );
        g.vertices = vec![
            railworld_core::node::Vertex {
                point: Vec3::new(10.0, 0.0, 10.0),
                ..Default::default()
            },
            railworld_core::node::Vertex {
                point: Vec3::new(40.0, 0.0, 10.0),
                ..Default::default()
            },
            railworld_core::node::Vertex {
                point: Vec3::new(10.0, 0.0, 40.0),
                ..Default::default()
            },
        ];
        let mut node = WorldNode::new(
            "",
            Vec3::new(20.0, 0.0, 20.0),
            NodePayload::Geometry(g),
        );
        node.radius_sq = railworld_core::node::DEFAULT_RADIUS_SQ;
        world.add_node(node);

        let mut out = Vec::new();
        write_bake(&world, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("squares"));
        assert!(text.contains("column"));
        assert!(text.contains("texture"));
        assert!(text.contains("vertices"));
    }
}
