//! Cluster merging - the geometry union of a group's children
//!
//! Concatenates the children's triangles while welding vertices by
//! quantized position, so seams between siblings disappear from the
//! merged topology. Does NOT simplify. The merged cluster's boundary
//! edges are exactly the group-outer rim the simplifier must lock.
//!
//! Author: Moroya Sakamoto

use std::collections::HashMap;

use crate::cluster::{quantize, Cluster, PosKey};

/// Quantization scale for merge welding
const WELD_QUANT: f32 = 100_000.0;

/// Merge several clusters into one welded cluster
///
/// Vertices are keyed by quantized position; the first occurrence wins
/// the slot and later occurrences accumulate their normal into it
/// (sum-then-normalize, so degenerate normals stay harmless). Indices
/// are rewritten through the per-child remap in child order.
pub fn merge_clusters(all_clusters: &[Cluster], cluster_indices: &[u32]) -> Cluster {
    let mut merged = Cluster::default();
    let mut weld_map: HashMap<PosKey, u32> = HashMap::new();

    for &ci in cluster_indices {
        let src = &all_clusters[ci as usize];
        let mut remap = vec![0u32; src.vertices.len()];

        for (v, vertex) in src.vertices.iter().enumerate() {
            let key = quantize(vertex.position, WELD_QUANT);
            match weld_map.get(&key) {
                Some(&existing) => {
                    remap[v] = existing;
                    merged.vertices[existing as usize].normal += vertex.normal;
                }
                None => {
                    let new_idx = merged.vertices.len() as u32;
                    merged.vertices.push(*vertex);
                    weld_map.insert(key, new_idx);
                    remap[v] = new_idx;
                }
            }
        }

        for &idx in &src.indices {
            merged.indices.push(remap[idx as usize]);
        }
    }

    for v in &mut merged.vertices {
        let len = v.normal.length();
        if len > 1e-8 {
            v.normal /= len;
        }
    }

    merged.compute_bounds_and_metrics();
    merged.compute_boundary_edges();
    merged
}
