//! Leaf clustering - partition a raw mesh into clusters
//!
//! Triangles are sorted by the Morton code of their centroid
//! (normalized to the mesh bounds) and cut into contiguous runs of at
//! most `cluster_size` triangles. Morton-key computation fans out over
//! `rayon`; the order-preserving collect keeps the result deterministic.
//!
//! Author: Moroya Sakamoto

use std::collections::HashMap;

use rayon::prelude::*;

use crate::cluster::Cluster;
use crate::morton::morton_encode;
use crate::types::{BuildConfig, RawMesh};

/// Build leaf clusters from a raw mesh
///
/// Appends the new clusters to `out_clusters` and returns their
/// indices. Every leaf has `mip_level = 0` and `lod_error = 0`. The
/// local vertex tables deduplicate on the global vertex index only -
/// the raw mesh's own dedup is authoritative at this stage.
pub fn build_leaf_clusters(
    mesh: &RawMesh,
    out_clusters: &mut Vec<Cluster>,
    config: &BuildConfig,
) -> Vec<u32> {
    let num_tris = mesh.num_tris();
    if num_tris == 0 {
        return Vec::new();
    }

    let bounds_min = mesh.bounds.min;
    let bounds_size = mesh.bounds.normalization_size();

    let mut tri_order: Vec<(u32, u32)> = (0..num_tris)
        .into_par_iter()
        .map(|t| {
            let base = t as usize * 3;
            let p0 = mesh.vertices[mesh.indices[base] as usize].position;
            let p1 = mesh.vertices[mesh.indices[base + 1] as usize].position;
            let p2 = mesh.vertices[mesh.indices[base + 2] as usize].position;
            let centroid = (p0 + p1 + p2) / 3.0;
            let normalized = (centroid - bounds_min) / bounds_size;
            (t, morton_encode(normalized))
        })
        .collect();

    // Stable sort: equal codes keep input triangle order
    tri_order.sort_by_key(|&(_, code)| code);

    let mut new_cluster_indices = Vec::new();

    for run in tri_order.chunks(config.cluster_size as usize) {
        let mut cluster = Cluster::default();
        let mut global_to_local: HashMap<u32, u32> = HashMap::new();

        for &(orig_tri, _) in run {
            let base = orig_tri as usize * 3;
            for v in 0..3 {
                let global_idx = mesh.indices[base + v];
                let local_idx = *global_to_local.entry(global_idx).or_insert_with(|| {
                    let idx = cluster.vertices.len() as u32;
                    cluster.vertices.push(mesh.vertices[global_idx as usize]);
                    idx
                });
                cluster.indices.push(local_idx);
            }
        }

        cluster.mip_level = 0;
        cluster.lod_error = 0.0;
        cluster.compute_bounds_and_metrics();
        cluster.compute_boundary_edges();

        new_cluster_indices.push(out_clusters.len() as u32);
        out_clusters.push(cluster);
    }

    new_cluster_indices
}
