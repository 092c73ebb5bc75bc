//! Runtime cut selection over the cluster DAG
//!
//! Given a view, selects the set of clusters whose projected geometric
//! error stays within the pixel budget - one cluster per leaf-to-root
//! path. Because sibling clusters share their generating group's LOD
//! sphere and error bit-exactly, the keep-or-refine decision is uniform
//! per group and the selected cut meets without cracks.
//!
//! Frustum culling, rasterization and display are out of scope; this
//! is the pure LOD decision consumers build on.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;

use crate::dag::ClusterDag;
use crate::types::{BoundingSphere, INVALID_INDEX};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// View parameters for LOD selection
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LodView {
    /// Camera world position
    pub origin: Vec3,
    /// World-error to screen-pixels scale factor
    pub lod_scale: f32,
    /// Projected error budget in pixels
    pub error_threshold: f32,
}

impl LodView {
    /// Derive the LOD scale from perspective camera parameters
    ///
    /// `lod_scale = 0.5 * proj11 * viewport_height / max_pixels_per_edge`
    /// with `proj11 = 1 / tan(fov_y / 2)`, so a projected error of 1.0
    /// means "error covers `max_pixels_per_edge` pixels".
    pub fn from_perspective(
        origin: Vec3,
        fov_y_radians: f32,
        viewport_height: f32,
        max_pixels_per_edge: f32,
    ) -> Self {
        let proj11 = 1.0 / (fov_y_radians * 0.5).tan();
        LodView {
            origin,
            lod_scale: 0.5 * proj11 * viewport_height / max_pixels_per_edge,
            error_threshold: 1.0,
        }
    }

    /// Geometric error projected to pixels at the sphere's distance
    ///
    /// The distance is clamped to the sphere radius so a camera inside
    /// the bounds always sees the error at full size.
    #[inline]
    pub fn projected_error(&self, error: f32, bounds: &BoundingSphere) -> f32 {
        let dist = (bounds.center - self.origin).length().max(bounds.radius);
        if dist <= 0.0 {
            return f32::INFINITY;
        }
        error * self.lod_scale / dist
    }
}

/// Statistics of a selected cut
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CutStats {
    /// Clusters in the cut
    pub clusters_selected: u32,
    /// Triangles in the cut
    pub total_triangles: u32,
    /// Selected cluster count per mip level
    pub clusters_by_level: Vec<u32>,
}

impl CutStats {
    /// Gather stats for a cut previously returned by [`select_cut`]
    pub fn collect(dag: &ClusterDag, cut: &[u32]) -> Self {
        let mut stats = CutStats {
            clusters_selected: cut.len() as u32,
            ..Default::default()
        };
        if cut.is_empty() {
            return stats;
        }
        let max_level = cut
            .iter()
            .map(|&ci| dag.clusters[ci as usize].mip_level)
            .max()
            .unwrap_or(0);
        stats.clusters_by_level = vec![0; max_level as usize + 1];
        for &ci in cut {
            let cluster = &dag.clusters[ci as usize];
            stats.total_triangles += cluster.num_tris;
            stats.clusters_by_level[cluster.mip_level as usize] += 1;
        }
        stats
    }
}

/// True if the coarser representation above this cluster suffices
///
/// That is the parent output of the cluster's containing group; its
/// error and bounds are shared by all siblings, so this test gives the
/// same answer for every child of the group.
#[inline]
fn parent_suffices(dag: &ClusterDag, group_index: u32, view: &LodView) -> bool {
    if group_index == INVALID_INDEX {
        return false; // topmost clusters have nothing coarser
    }
    let group = &dag.groups[group_index as usize];
    if group.parent_clusters.is_empty() {
        return false;
    }
    view.projected_error(group.parent_lod_error, &group.lod_bounds) <= view.error_threshold
}

/// Select the view-dependent cut through the DAG
///
/// A cluster is selected iff its own projected error is within the
/// budget and the coarser representation above it is not. Leaves carry
/// zero error, so the cut always exists; far views collapse to the
/// roots. The result covers every leaf-to-root path exactly once.
pub fn select_cut(dag: &ClusterDag, view: &LodView) -> Vec<u32> {
    let mut cut = Vec::new();
    for (i, cluster) in dag.clusters.iter().enumerate() {
        let own_ok =
            view.projected_error(cluster.lod_error, &cluster.lod_bounds) <= view.error_threshold;
        if own_ok && !parent_suffices(dag, cluster.group_index, view) {
            cut.push(i as u32);
        }
    }
    cut
}
