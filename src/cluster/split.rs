//! Cluster splitting - re-cut a welded cluster into cluster-sized pieces
//!
//! After a group is merged and simplified its triangle count may still
//! exceed the cluster budget; this re-runs the Morton partitioning from
//! leaf clustering, but normalized to the input cluster's own bounds
//! and deduplicating on merged-vertex index (no further welding).
//!
//! Author: Moroya Sakamoto

use std::collections::HashMap;

use rayon::prelude::*;

use crate::cluster::Cluster;
use crate::morton::morton_encode;
use crate::types::BuildConfig;

/// Split a cluster into clusters of at most `cluster_size` triangles
///
/// The outputs cover the input geometry exactly. An input already
/// within budget is returned unchanged.
pub fn split_cluster(merged: Cluster, config: &BuildConfig) -> Vec<Cluster> {
    let num_tris = merged.num_tris;
    if num_tris <= config.cluster_size {
        return vec![merged];
    }

    let bounds_min = merged.bounds.min;
    let bounds_size = merged.bounds.normalization_size();

    let mut tri_order: Vec<(u32, u32)> = (0..num_tris)
        .into_par_iter()
        .map(|t| {
            let base = t as usize * 3;
            let p0 = merged.vertices[merged.indices[base] as usize].position;
            let p1 = merged.vertices[merged.indices[base + 1] as usize].position;
            let p2 = merged.vertices[merged.indices[base + 2] as usize].position;
            let centroid = (p0 + p1 + p2) / 3.0;
            let normalized = (centroid - bounds_min) / bounds_size;
            (t, morton_encode(normalized))
        })
        .collect();
    tri_order.sort_by_key(|&(_, code)| code);

    let mut result = Vec::new();
    for run in tri_order.chunks(config.cluster_size as usize) {
        let mut cluster = Cluster::default();
        let mut remap: HashMap<u32, u32> = HashMap::new();

        for &(orig_tri, _) in run {
            let base = orig_tri as usize * 3;
            for v in 0..3 {
                let src_idx = merged.indices[base + v];
                let local_idx = *remap.entry(src_idx).or_insert_with(|| {
                    let idx = cluster.vertices.len() as u32;
                    cluster.vertices.push(merged.vertices[src_idx as usize]);
                    idx
                });
                cluster.indices.push(local_idx);
            }
        }

        cluster.compute_bounds_and_metrics();
        cluster.compute_boundary_edges();
        result.push(cluster);
    }

    result
}
