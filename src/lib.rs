//! # ALICE-Nanite
//!
//! **A.L.I.C.E. Nanite - Virtualized Geometry Cluster DAG Builder**
//!
//! Builds a hierarchical, view-dependent level-of-detail structure for
//! triangle meshes in the style of virtualized-geometry engines (UE5
//! Nanite). A raw indexed mesh is partitioned into small spatially
//! coherent *clusters*, which are then iteratively grouped, jointly
//! simplified, and re-split until a single root remains. The result is a
//! directed acyclic graph through which a renderer can select, per view,
//! a crack-free cut whose projected screen-space error stays below a
//! pixel budget.
//!
//! ## Pipeline
//!
//! - **Leaf clustering**: Morton-sorted triangles cut into clusters of
//!   at most [`CLUSTER_SIZE`](types::CLUSTER_SIZE) triangles
//! - **Grouping**: spatially adjacent sibling clusters gathered into
//!   groups for joint reduction
//! - **Reduction**: each group merged (vertex welding), simplified to
//!   half its triangles with quadric error metrics and a locked outer
//!   boundary, then split back into clusters
//! - **DAG linkage**: parent clusters inherit the group's merged LOD
//!   bounds and error, so siblings agree bit-exactly and a runtime cut
//!   never shows cracks
//!
//! ## Example
//!
//! ```rust
//! use alice_nanite::prelude::*;
//! use glam::Vec3;
//!
//! let mesh = RawMesh::from_positions(
//!     &[Vec3::ZERO, Vec3::X, Vec3::Y],
//!     &[0, 1, 2],
//! );
//!
//! let dag = ClusterDag::build(&mesh, &BuildConfig::default()).unwrap();
//! assert_eq!(dag.max_mip_level(), 0);
//! assert_eq!(dag.root_group_indices().len(), 1);
//! ```
//!
//! ## Author
//!
//! Moroya Sakamoto

#![warn(missing_docs)]

pub mod cluster;
pub mod dag;
pub mod morton;
pub mod select;
pub mod simplify;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::cluster::{
        build_leaf_clusters, merge_clusters, split_cluster, Cluster,
    };
    pub use crate::dag::{ClusterDag, ClusterGroup};
    pub use crate::morton::morton_encode;
    pub use crate::select::{select_cut, CutStats, LodView};
    pub use crate::simplify::simplify_cluster;
    pub use crate::types::{
        Aabb, BoundingSphere, BuildConfig, BuildError, RawMesh, Vertex,
        CLUSTER_SIZE, INVALID_INDEX, MAX_GROUP_SIZE, MIN_CLUSTER_SIZE,
        MIN_GROUP_SIZE,
    };
}
