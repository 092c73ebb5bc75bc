//! Common test helpers for ALICE-Nanite integration tests
//!
//! Author: Moroya Sakamoto

use alice_nanite::prelude::*;
use glam::Vec3;
use std::collections::HashMap;

// ============================================================================
// Standard test meshes
// ============================================================================

/// The smallest valid mesh: one triangle in the XY plane
pub fn single_triangle() -> RawMesh {
    RawMesh::from_positions(&[Vec3::ZERO, Vec3::X, Vec3::Y], &[0, 1, 2])
}

/// Closed tetrahedron, 4 triangles, outward winding
pub fn tetrahedron() -> RawMesh {
    tetrahedron_at(Vec3::ZERO)
}

/// Tetrahedron translated by `offset`
pub fn tetrahedron_at(offset: Vec3) -> RawMesh {
    let positions: Vec<Vec3> = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.5, 1.0, 0.0),
        Vec3::new(0.5, 0.5, 1.0),
    ]
    .iter()
    .map(|&p| p + offset)
    .collect();
    RawMesh::from_positions(&positions, &[0, 2, 1, 0, 1, 3, 1, 2, 3, 2, 0, 3])
}

/// Two tetrahedra far apart in one mesh (disconnected surface)
pub fn two_tetrahedra() -> RawMesh {
    let a = tetrahedron_at(Vec3::ZERO);
    let b = tetrahedron_at(Vec3::splat(100.0));
    let mut positions: Vec<Vec3> = a.vertices.iter().map(|v| v.position).collect();
    positions.extend(b.vertices.iter().map(|v| v.position));
    let mut indices = a.indices.clone();
    indices.extend(b.indices.iter().map(|&i| i + a.vertices.len() as u32));
    RawMesh::from_positions(&positions, &indices)
}

/// Flat grid of `nx * ny` cells in the XY plane, 2 triangles per cell
pub fn grid(nx: usize, ny: usize) -> RawMesh {
    let mut positions = Vec::new();
    for y in 0..=ny {
        for x in 0..=nx {
            positions.push(Vec3::new(x as f32, y as f32, 0.0));
        }
    }
    let mut indices = Vec::new();
    let stride = (nx + 1) as u32;
    for y in 0..ny as u32 {
        for x in 0..nx as u32 {
            let v0 = y * stride + x;
            indices.extend_from_slice(&[v0, v0 + 1, v0 + stride + 1]);
            indices.extend_from_slice(&[v0, v0 + stride + 1, v0 + stride]);
        }
    }
    RawMesh::from_positions(&positions, &indices)
}

/// Unit sphere approximated by a subdivided icosahedron
///
/// 20 * 4^subdivisions triangles; deterministic construction.
pub fn icosphere(subdivisions: u32) -> RawMesh {
    let phi = (1.0 + 5.0f32.sqrt()) / 2.0;
    let mut positions: Vec<Vec3> = [
        (-1.0, phi, 0.0),
        (1.0, phi, 0.0),
        (-1.0, -phi, 0.0),
        (1.0, -phi, 0.0),
        (0.0, -1.0, phi),
        (0.0, 1.0, phi),
        (0.0, -1.0, -phi),
        (0.0, 1.0, -phi),
        (phi, 0.0, -1.0),
        (phi, 0.0, 1.0),
        (-phi, 0.0, -1.0),
        (-phi, 0.0, 1.0),
    ]
    .iter()
    .map(|&(x, y, z)| Vec3::new(x, y, z).normalize())
    .collect();
    let mut faces: Vec<[u32; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoint_cache: HashMap<(u32, u32), u32> = HashMap::new();
        let mut next_faces = Vec::with_capacity(faces.len() * 4);
        for face in &faces {
            let mut mids = [0u32; 3];
            for e in 0..3 {
                let (a, b) = (face[e], face[(e + 1) % 3]);
                let key = if a < b { (a, b) } else { (b, a) };
                mids[e] = *midpoint_cache.entry(key).or_insert_with(|| {
                    let mid = ((positions[a as usize] + positions[b as usize]) * 0.5).normalize();
                    positions.push(mid);
                    positions.len() as u32 - 1
                });
            }
            next_faces.push([face[0], mids[0], mids[2]]);
            next_faces.push([face[1], mids[1], mids[0]]);
            next_faces.push([face[2], mids[2], mids[1]]);
            next_faces.push([mids[0], mids[1], mids[2]]);
        }
        faces = next_faces;
    }

    let indices: Vec<u32> = faces.iter().flatten().copied().collect();
    RawMesh::from_positions(&positions, &indices)
}

// ============================================================================
// Invariant checks shared by the integration tests
// ============================================================================

/// Assert the structural invariants of a built DAG against its input
pub fn check_invariants(dag: &ClusterDag, mesh: &RawMesh, config: &BuildConfig) {
    if mesh.num_tris() == 0 {
        assert!(dag.clusters.is_empty());
        assert!(dag.groups.is_empty());
        return;
    }

    // Cluster size bound, index validity, error sign
    for (i, c) in dag.clusters.iter().enumerate() {
        assert!(
            c.num_tris <= config.cluster_size,
            "cluster {} exceeds budget: {}",
            i,
            c.num_tris
        );
        assert_eq!(c.indices.len(), c.num_tris as usize * 3);
        for &idx in &c.indices {
            assert!((idx as usize) < c.vertices.len(), "cluster {} bad index", i);
        }
        assert!(c.lod_error >= 0.0);
        assert_eq!(c.boundary_edges.len(), c.num_tris as usize * 3);
    }

    // Triangle conservation at leaves
    let leaf_tris: u32 = dag
        .clusters
        .iter()
        .filter(|c| c.mip_level == 0)
        .map(|c| c.num_tris)
        .sum();
    assert_eq!(leaf_tris, mesh.num_tris());

    // Leaf LOD bounds mirror the cluster sphere; leaves carry no error
    for c in dag.clusters.iter().filter(|c| c.mip_level == 0) {
        assert_eq!(c.lod_bounds, c.sphere_bounds);
        assert_eq!(c.lod_error, 0.0);
        assert_eq!(c.generating_group_index, INVALID_INDEX);
    }

    // Group linkage: monotone error, shared LOD bounds, mip levels
    for (gi, g) in dag.groups.iter().enumerate() {
        assert!(!g.children.is_empty());
        let promoted = g.children == g.parent_clusters;

        for &ci in &g.children {
            let c = &dag.clusters[ci as usize];
            assert!(
                g.parent_lod_error >= c.lod_error,
                "group {} error not monotone",
                gi
            );
            assert_eq!(c.mip_level, g.mip_level);
            if !promoted {
                assert_eq!(c.group_index, gi as u32);
            }
        }
        for &pi in &g.parent_clusters {
            let p = &dag.clusters[pi as usize];
            assert_eq!(p.lod_error, g.parent_lod_error);
            assert_eq!(p.lod_bounds, g.lod_bounds, "group {} lod bounds differ", gi);
            if !promoted {
                assert_eq!(p.mip_level, g.mip_level + 1);
                assert_eq!(p.generating_group_index, gi as u32);
            }
        }
    }

    // Each cluster is a child of at most one group and a parent of at
    // most one group
    let mut child_of = vec![0u32; dag.clusters.len()];
    let mut parent_of = vec![0u32; dag.clusters.len()];
    for g in &dag.groups {
        if g.children == g.parent_clusters {
            continue; // promoted roots reference the same cluster twice
        }
        for &ci in &g.children {
            child_of[ci as usize] += 1;
        }
        for &pi in &g.parent_clusters {
            parent_of[pi as usize] += 1;
        }
    }
    assert!(child_of.iter().all(|&n| n <= 1));
    assert!(parent_of.iter().all(|&n| n <= 1));

    // DAG shape: at least one root, and climbing containing groups
    // from any cluster terminates at a root or a topmost cluster
    let roots = dag.root_group_indices();
    assert!(!roots.is_empty(), "no root group");
    for start in 0..dag.clusters.len() {
        let mut ci = start as u32;
        let mut hops = 0;
        loop {
            hops += 1;
            assert!(
                hops <= dag.groups.len() + 2,
                "cycle climbing from cluster {}",
                start
            );
            let gi = dag.clusters[ci as usize].group_index;
            if gi == INVALID_INDEX {
                // Topmost cluster: must be a parent of some root group
                assert!(
                    dag.groups
                        .iter()
                        .any(|g| g.is_root && g.parent_clusters.contains(&ci)),
                    "dangling topmost cluster {}",
                    ci
                );
                break;
            }
            let g = &dag.groups[gi as usize];
            if g.is_root {
                break;
            }
            if g.parent_clusters.is_empty() {
                // Group produced nothing; the cluster must have been
                // promoted into a root group of its own
                assert!(
                    dag.groups
                        .iter()
                        .any(|rg| rg.is_root && rg.parent_clusters.contains(&ci)),
                    "cluster {} stuck under a barren group",
                    ci
                );
                break;
            }
            ci = g.parent_clusters[0];
        }
    }

    // Boundary flags agree with a direct multiplicity recount
    for c in &dag.clusters {
        check_boundary_flags(c);
    }
}

/// Recount undirected edge multiplicity with the same quantization rule
/// and compare with the stored boundary flags
pub fn check_boundary_flags(cluster: &Cluster) {
    let quantize = |p: Vec3| {
        (
            (p.x * 10_000.0) as i32,
            (p.y * 10_000.0) as i32,
            (p.z * 10_000.0) as i32,
        )
    };
    let mut edge_count: HashMap<_, u32> = HashMap::new();
    for tri in cluster.indices.chunks_exact(3) {
        for e in 0..3 {
            let a = quantize(cluster.vertices[tri[e] as usize].position);
            let b = quantize(cluster.vertices[tri[(e + 1) % 3] as usize].position);
            let key = if a <= b { (a, b) } else { (b, a) };
            *edge_count.entry(key).or_insert(0) += 1;
        }
    }
    for (t, tri) in cluster.indices.chunks_exact(3).enumerate() {
        for e in 0..3 {
            let a = quantize(cluster.vertices[tri[e] as usize].position);
            let b = quantize(cluster.vertices[tri[(e + 1) % 3] as usize].position);
            let key = if a <= b { (a, b) } else { (b, a) };
            let expected = edge_count[&key] == 1;
            assert_eq!(
                cluster.boundary_edges[t * 3 + e],
                expected,
                "boundary flag mismatch at tri {} edge {}",
                t,
                e
            );
        }
    }
}
