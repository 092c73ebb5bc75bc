//! Core types for the cluster DAG build
//!
//! Bounds primitives, the raw input mesh, build configuration, and the
//! build error model. Everything downstream of the builder references
//! clusters and groups by plain `u32` indices into flat arrays; the
//! constants here match UE5 Nanite conventions.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Max triangles per cluster
pub const CLUSTER_SIZE: u32 = 128;

/// Min target triangles per cluster when simplifying a group
pub const MIN_CLUSTER_SIZE: u32 = 64;

/// Min clusters per group
pub const MIN_GROUP_SIZE: u32 = 4;

/// Max clusters per group
pub const MAX_GROUP_SIZE: u32 = 32;

/// Sentinel for "no cluster / no group"
pub const INVALID_INDEX: u32 = u32::MAX;

/// Axis-Aligned Bounding Box
///
/// The empty box is inverted (`min = +inf`, `max = -inf`) so that any
/// `expand_point` initializes it correctly.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Aabb::empty()
    }
}

impl Aabb {
    /// Create an empty (inverted) AABB
    #[inline]
    pub fn empty() -> Self {
        Aabb {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Create AABB from min/max
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    /// Expand AABB to include a point
    #[inline]
    pub fn expand_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Expand AABB to include another AABB
    #[inline]
    pub fn expand_aabb(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Get center of AABB
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get half-extent of AABB
    #[inline]
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// True if the box contains at least one point (min <= max)
    #[inline]
    pub fn valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Box size with zero-extent axes replaced by 1.0, for safe
    /// normalization of positions into [0, 1]
    #[inline]
    pub fn normalization_size(&self) -> Vec3 {
        let size = self.max - self.min;
        Vec3::new(
            if size.x < 1e-8 { 1.0 } else { size.x },
            if size.y < 1e-8 { 1.0 } else { size.y },
            if size.z < 1e-8 { 1.0 } else { size.z },
        )
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingSphere {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
}

impl BoundingSphere {
    /// Sphere enclosing an AABB: center = box center, radius = |extent|
    #[inline]
    pub fn from_aabb(aabb: &Aabb) -> Self {
        BoundingSphere {
            center: aabb.center(),
            radius: aabb.extent().length(),
        }
    }

    /// Minimum sphere enclosing two spheres
    ///
    /// Uses the classical containment test: if one sphere contains the
    /// other, return it, otherwise span both along the connecting axis.
    /// A zero-radius input yields the other sphere unchanged.
    pub fn merge(a: &BoundingSphere, b: &BoundingSphere) -> Self {
        if a.radius <= 0.0 {
            return *b;
        }
        if b.radius <= 0.0 {
            return *a;
        }
        let d = b.center - a.center;
        let dist = d.length();
        if dist + b.radius <= a.radius {
            return *a; // b inside a
        }
        if dist + a.radius <= b.radius {
            return *b; // a inside b
        }
        let radius = (dist + a.radius + b.radius) * 0.5;
        BoundingSphere {
            center: a.center + d * ((radius - a.radius) / dist),
            radius,
        }
    }

    /// Left-fold of pairwise merges
    ///
    /// Not globally optimal but stable and monotone.
    pub fn from_spheres(spheres: &[BoundingSphere]) -> Self {
        let mut iter = spheres.iter();
        let first = match iter.next() {
            Some(s) => *s,
            None => return BoundingSphere::default(),
        };
        iter.fold(first, |acc, s| BoundingSphere::merge(&acc, s))
    }

    /// True if this sphere fully contains `other`
    #[inline]
    pub fn contains(&self, other: &BoundingSphere) -> bool {
        (other.center - self.center).length() + other.radius <= self.radius + 1e-5
    }
}

/// Vertex with position and normal
///
/// Geometry only; UVs and other attributes are out of scope for the
/// cluster build.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vertex {
    /// Position in 3D space
    pub position: Vec3,
    /// Surface normal
    pub normal: Vec3,
}

impl Vertex {
    /// Create a new vertex
    #[inline]
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Vertex { position, normal }
    }
}

/// Raw indexed triangle mesh, the input to the DAG build
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawMesh {
    /// Vertex array
    pub vertices: Vec<Vertex>,
    /// Triangle indices, three per triangle, 0-based
    pub indices: Vec<u32>,
    /// AABB enclosing all positions
    pub bounds: Aabb,
}

impl RawMesh {
    /// Triangle count
    #[inline]
    pub fn num_tris(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    /// Build a mesh from bare positions and indices
    ///
    /// Vertex normals are accumulated from area-weighted face normals
    /// and renormalized; bounds are recomputed.
    pub fn from_positions(positions: &[Vec3], indices: &[u32]) -> Self {
        let mut normals = vec![Vec3::ZERO; positions.len()];
        for tri in indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let n = (positions[i1] - positions[i0]).cross(positions[i2] - positions[i0]);
            normals[i0] += n;
            normals[i1] += n;
            normals[i2] += n;
        }
        let vertices = positions
            .iter()
            .zip(normals.iter())
            .map(|(&p, &n)| Vertex::new(p, n.normalize_or_zero()))
            .collect();

        let mut mesh = RawMesh {
            vertices,
            indices: indices.to_vec(),
            bounds: Aabb::empty(),
        };
        mesh.recompute_bounds();
        mesh
    }

    /// Recompute `bounds` from the vertex positions
    pub fn recompute_bounds(&mut self) {
        let mut bounds = Aabb::empty();
        for v in &self.vertices {
            bounds.expand_point(v.position);
        }
        self.bounds = bounds;
    }

    /// Check the preconditions of the DAG build
    ///
    /// Index count must be a multiple of 3, every index in bounds, and
    /// every position finite. An empty mesh is valid (the build returns
    /// an empty DAG for it).
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.indices.len() % 3 != 0 {
            return Err(BuildError::IndexCountNotTriangular {
                index_count: self.indices.len(),
            });
        }
        for &idx in &self.indices {
            if idx as usize >= self.vertices.len() {
                return Err(BuildError::IndexOutOfBounds {
                    index: idx,
                    vertex_count: self.vertices.len(),
                });
            }
        }
        for (i, v) in self.vertices.iter().enumerate() {
            if !v.position.is_finite() {
                return Err(BuildError::NonFinitePosition { vertex: i });
            }
        }
        Ok(())
    }
}

/// Configuration for the cluster DAG build
///
/// The defaults match UE5 Nanite conventions. All knobs are tunable;
/// semantics are fixed.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BuildConfig {
    /// Target maximum triangles per cluster
    pub cluster_size: u32,
    /// Floor on per-group target triangles after simplification
    pub min_cluster_size: u32,
    /// Minimum clusters per group
    pub min_group_size: u32,
    /// Maximum clusters per group
    pub max_group_size: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            cluster_size: CLUSTER_SIZE,
            min_cluster_size: MIN_CLUSTER_SIZE,
            min_group_size: MIN_GROUP_SIZE,
            max_group_size: MAX_GROUP_SIZE,
        }
    }
}

impl BuildConfig {
    /// Small clusters for fast preview builds and tests
    pub fn preview() -> Self {
        BuildConfig {
            cluster_size: 32,
            min_cluster_size: 16,
            ..Default::default()
        }
    }
}

/// Errors for malformed build input
///
/// The DAG is never partially published: validation runs before any
/// cluster is appended.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Index count is not a multiple of 3
    #[error("index count {index_count} is not a multiple of 3")]
    IndexCountNotTriangular {
        /// Offending index count
        index_count: usize,
    },

    /// A triangle index points past the vertex array
    #[error("index {index} out of bounds (vertex count: {vertex_count})")]
    IndexOutOfBounds {
        /// Offending index
        index: u32,
        /// Vertex array length
        vertex_count: usize,
    },

    /// A vertex position is NaN or infinite
    #[error("vertex {vertex} has a non-finite position")]
    NonFinitePosition {
        /// Offending vertex index
        vertex: usize,
    },
}
