//! Triangle subdivision against kilometer-square bounds.
//!
//! A plain triangle whose vertices stray more than 200 m beyond its
//! centroid's kilometer square would be culled while still visible. The
//! divider halves such triangles along the worst boundary-crossing edge,
//! recursively, until every piece fits its own square with margin.

use crate::math::Vec3;
use crate::node::{Geometry, Primitive, Vertex};

/// Allowed overhang beyond the kilometer square, meters.
pub const DIVIDE_MARGIN: f64 = 200.0;

const SQUARE: f64 = 1000.0;

/// Bounds of the box a triangle centered in this square must stay within.
fn bounds(center: Vec3) -> (f64, f64, f64, f64) {
    let x0 = SQUARE * (center.x / SQUARE).floor() - DIVIDE_MARGIN;
    let z0 = SQUARE * (center.z / SQUARE).floor() - DIVIDE_MARGIN;
    (
        x0,
        x0 + SQUARE + 2.0 * DIVIDE_MARGIN,
        z0,
        z0 + SQUARE + 2.0 * DIVIDE_MARGIN,
    )
}

fn fits(v: &[Vertex; 3], center: Vec3) -> bool {
    let (x0, x1, z0, z1) = bounds(center);
    v.iter().all(|v| {
        v.point.x >= x0 && v.point.x <= x1 && v.point.z >= z0 && v.point.z <= z1
    })
}

fn midpoint(a: &Vertex, b: &Vertex) -> Vertex {
    Vertex {
        point: (a.point + b.point) / 2.0,
        normal: ((a.normal + b.normal) / 2.0).normalized(),
        u: (a.u + b.u) / 2.0,
        v: (a.v + b.v) / 2.0,
    }
}

/// Signed distance of each vertex to each of the four box planes; the
/// edge whose endpoint product is most negative straddles a boundary the
/// deepest and gets split first.
fn worst_edge(v: &[Vertex; 3], center: Vec3) -> Option<usize> {
    let (x0, x1, z0, z1) = bounds(center);
    let dist = |p: Vec3| [p.x - x0, x1 - p.x, p.z - z0, z1 - p.z];
    let d: Vec<[f64; 4]> = v.iter().map(|v| dist(v.point)).collect();
    let mut best = None;
    let mut best_mul = 0.0;
    for edge in 0..3 {
        let a = &d[edge];
        let b = &d[(edge + 1) % 3];
        for plane in 0..4 {
            let mul = a[plane] * b[plane];
            if mul < best_mul {
                best_mul = mul;
                best = Some(edge);
            }
        }
    }
    best
}

fn centroid(v: &[Vertex; 3]) -> Vec3 {
    (v[0].point + v[1].point + v[2].point) / 3.0
}

fn divide_triangle(v: [Vertex; 3], out: &mut Vec<[Vertex; 3]>, depth: u32) {
    let center = centroid(&v);
    if depth == 0 || fits(&v, center) {
        out.push(v);
        return;
    }
    let Some(edge) = worst_edge(&v, center) else {
        // All vertices on one side of every plane; nothing to split.
        out.push(v);
        return;
    };
    let a = edge;
    let b = (edge + 1) % 3;
    let c = (edge + 2) % 3;
    let m = midpoint(&v[a], &v[b]);
    divide_triangle([v[a], m, v[c]], out, depth - 1);
    divide_triangle([m, v[b], v[c]], out, depth - 1);
}

/// Split a plain-triangle geometry into pieces that each fit their own
/// kilometer square with margin. The first piece replaces the input; the
/// rest become new geometry nodes. Non-triangle input passes through
/// untouched.
pub fn divide(geometry: &mut Geometry) -> Vec<Geometry> {
    if geometry.primitive != Primitive::Triangles {
        return Vec::new();
    }
    let mut pieces: Vec<[Vertex; 3]> = Vec::new();
    for tri in geometry.vertices.chunks_exact(3) {
        divide_triangle([tri[0], tri[1], tri[2]], &mut pieces, 16);
    }
    if pieces.len() * 3 == geometry.vertices.len() {
        // Nothing split; keep the original buffer.
        return Vec::new();
    }

    // Group pieces by the kilometer square of their centroid; the group
    // containing the first piece stays in place.
    let square_of = |v: &[Vertex; 3]| {
        let c = centroid(v);
        (
            (c.x / SQUARE).floor() as i64,
            (c.z / SQUARE).floor() as i64,
        )
    };
    let home = square_of(&pieces[0]);
    let mut kept = Vec::new();
    let mut groups: Vec<((i64, i64), Vec<Vertex>)> = Vec::new();
    for piece in pieces {
        let sq = square_of(&piece);
        if sq == home {
            kept.extend_from_slice(&piece);
        } else if let Some((_, verts)) = groups.iter_mut().find(|(g, _)| *g == sq) {
            verts.extend_from_slice(&piece);
        } else {
            groups.push((sq, piece.to_vec()));
        }
    }
    geometry.vertices = kept;
    groups
        .into_iter()
        .map(|(_, vertices)| Geometry {
            vertices,
            ..geometry.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TextureId;

    fn vert(x: f64, z: f64) -> Vertex {
        Vertex {
            point: Vec3::new(x, 0.0, z),
            normal: Vec3::new(0.0, 1.0, 0.0),
            u: x / 100.0,
            v: z / 100.0,
        }
    }

    fn geometry(verts: Vec<Vertex>) -> Geometry {
        let mut g = Geometry::new(Primitive::Triangles, TextureId(1));
        g.vertices = verts;
        g
    }

    #[test]
    fn small_triangle_untouched() {
        let mut g = geometry(vec![vert(10.0, 10.0), vert(20.0, 10.0), vert(10.0, 20.0)]);
        let extra = divide(&mut g);
        assert!(extra.is_empty());
        assert_eq!(g.vertices.len(), 3);
    }

    #[test]
    fn wide_triangle_splits_within_margin() {
        // Spans three kilometer squares along x.
        let mut g = geometry(vec![
            vert(-1300.0, 10.0),
            vert(1300.0, 10.0),
            vert(0.0, 50.0),
        ]);
        let extra = divide(&mut g);
        assert!(!extra.is_empty());
        let mut all = vec![g];
        all.extend(extra);
        for geo in &all {
            for tri in geo.vertices.chunks_exact(3) {
                let v = [tri[0], tri[1], tri[2]];
                let c = centroid(&v);
                assert!(fits(&v, c), "piece exceeds its margin box: {v:?}");
            }
        }
    }

    #[test]
    fn midpoint_interpolates_uv() {
        let m = midpoint(&vert(0.0, 0.0), &vert(100.0, 0.0));
        assert!((m.point.x - 50.0).abs() < 1e-12);
        assert!((m.u - 0.5).abs() < 1e-12);
    }

    #[test]
    fn lines_pass_through() {
        let mut g = Geometry::new(Primitive::Lines, TextureId(1));
        g.vertices = vec![vert(-5000.0, 0.0), vert(5000.0, 0.0)];
        assert!(divide(&mut g).is_empty());
        assert_eq!(g.vertices.len(), 2);
    }
}
