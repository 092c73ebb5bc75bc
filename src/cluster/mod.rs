//! Mesh clusters - small spatially coherent triangle patches
//!
//! A [`Cluster`] owns a local vertex table and triangle indices into it,
//! plus the bounds, metrics and DAG linkage the runtime needs for LOD
//! selection. Construction is split across submodules:
//!
//! - [`leaf`]: partition a raw mesh into leaf clusters (Morton sort)
//! - [`merge`]: weld several clusters into one (group reduction input)
//! - [`split`]: re-cut an oversized cluster into cluster-sized pieces
//!
//! Author: Moroya Sakamoto

pub mod leaf;
pub mod merge;
pub mod split;

pub use leaf::build_leaf_clusters;
pub use merge::merge_clusters;
pub use split::split_cluster;

use std::collections::HashMap;

use glam::Vec3;

use crate::types::{Aabb, BoundingSphere, Vertex, INVALID_INDEX};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Quantization scale for boundary-edge position keys
const BOUNDARY_QUANT: f32 = 10_000.0;

/// Quantized position key, used to match coincident positions across
/// cluster-local vertex tables without exact float equality
pub(crate) type PosKey = (i32, i32, i32);

/// Snap a position to an integer grid at the given scale
#[inline]
pub(crate) fn quantize(p: Vec3, scale: f32) -> PosKey {
    ((p.x * scale) as i32, (p.y * scale) as i32, (p.z * scale) as i32)
}

/// A patch of at most `CLUSTER_SIZE` triangles with its own vertex table
///
/// Clusters are created by the build, appended to a flat store, and
/// never mutated afterwards; all linkage is by `u32` index.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    /// Local vertex array
    pub vertices: Vec<Vertex>,
    /// Triangle index triples into `vertices`
    pub indices: Vec<u32>,
    /// Triangle count (`indices.len() / 3`)
    pub num_tris: u32,

    /// Axis-aligned bounds of the local vertices
    pub bounds: Aabb,
    /// Sphere derived from `bounds`
    pub sphere_bounds: BoundingSphere,
    /// Sphere used for the projected LOD error test; equals
    /// `sphere_bounds` at leaves and the generating group's merged
    /// sphere at inner levels (shared bit-exactly among siblings)
    pub lod_bounds: BoundingSphere,

    /// Max geometric error introduced when this cluster was produced
    pub lod_error: f32,
    /// Average edge length
    pub edge_length: f32,
    /// Total triangle area
    pub surface_area: f32,
    /// 0 = leaf (finest), increasing toward root
    pub mip_level: u32,

    /// Group that contains this cluster as a child
    pub group_index: u32,
    /// Group whose reduction produced this cluster ([`INVALID_INDEX`]
    /// for leaves)
    pub generating_group_index: u32,

    /// Per directed edge: true iff the undirected edge has exactly one
    /// incident triangle in this cluster (`num_tris * 3` flags)
    pub boundary_edges: Vec<bool>,
}

impl Default for Cluster {
    fn default() -> Self {
        Cluster {
            vertices: Vec::new(),
            indices: Vec::new(),
            num_tris: 0,
            bounds: Aabb::empty(),
            sphere_bounds: BoundingSphere::default(),
            lod_bounds: BoundingSphere::default(),
            lod_error: 0.0,
            edge_length: 0.0,
            surface_area: 0.0,
            mip_level: 0,
            group_index: INVALID_INDEX,
            generating_group_index: INVALID_INDEX,
            boundary_edges: Vec::new(),
        }
    }
}

impl Cluster {
    /// Recompute `bounds`, `sphere_bounds`, `surface_area`,
    /// `edge_length` and `num_tris` from the geometry
    ///
    /// `lod_bounds` is initialized to `sphere_bounds` if still unset;
    /// an already-assigned LOD sphere is left alone.
    pub fn compute_bounds_and_metrics(&mut self) {
        self.bounds = Aabb::empty();
        self.surface_area = 0.0;
        self.edge_length = 0.0;
        self.num_tris = (self.indices.len() / 3) as u32;

        if self.vertices.is_empty() || self.indices.is_empty() {
            return;
        }

        for v in &self.vertices {
            self.bounds.expand_point(v.position);
        }
        self.sphere_bounds = BoundingSphere::from_aabb(&self.bounds);

        let mut total_edge_len = 0.0f32;
        let mut edge_count = 0u32;
        for tri in self.indices.chunks_exact(3) {
            let p0 = self.vertices[tri[0] as usize].position;
            let p1 = self.vertices[tri[1] as usize].position;
            let p2 = self.vertices[tri[2] as usize].position;

            self.surface_area += (p1 - p0).cross(p2 - p0).length() * 0.5;

            total_edge_len += p0.distance(p1) + p1.distance(p2) + p2.distance(p0);
            edge_count += 3;
        }
        if edge_count > 0 {
            self.edge_length = total_edge_len / edge_count as f32;
        }

        if self.lod_bounds.radius <= 0.0 {
            self.lod_bounds = self.sphere_bounds;
        }
    }

    /// Flag edges adjacent to only one triangle in this cluster
    ///
    /// Edges are keyed by the sorted pair of quantized endpoint
    /// positions, so coincident positions stored under different local
    /// vertices still count as the same undirected edge. The flags
    /// drive the simplifier's boundary lock.
    pub fn compute_boundary_edges(&mut self) {
        self.boundary_edges = vec![false; self.num_tris as usize * 3];

        let pos_key = |i: u32| quantize(self.vertices[i as usize].position, BOUNDARY_QUANT);
        let edge_key = |i0: u32, i1: u32| {
            let (a, b) = (pos_key(i0), pos_key(i1));
            if a <= b {
                (a, b)
            } else {
                (b, a)
            }
        };

        let mut edge_count: HashMap<(PosKey, PosKey), u32> =
            HashMap::with_capacity(self.num_tris as usize * 3);
        for tri in self.indices.chunks_exact(3) {
            for e in 0..3 {
                *edge_count
                    .entry(edge_key(tri[e], tri[(e + 1) % 3]))
                    .or_insert(0) += 1;
            }
        }

        for (t, tri) in self.indices.chunks_exact(3).enumerate() {
            for e in 0..3 {
                let count = edge_count
                    .get(&edge_key(tri[e], tri[(e + 1) % 3]))
                    .copied()
                    .unwrap_or(0);
                self.boundary_edges[t * 3 + e] = count < 2;
            }
        }
    }
}
