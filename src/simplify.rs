//! QEM (Quadric Error Metrics) cluster simplification
//!
//! Edge-collapse reduction based on the Garland & Heckbert algorithm
//! (1997), specialized for the cluster DAG build: boundary vertices can
//! be locked so a group's outer rim survives reduction bit-exactly and
//! neighboring groups keep meeting without cracks.
//!
//! # Features
//! - Quadric error metric with optimal vertex placement
//! - Parallel face quadric computation via `rayon`
//! - Union-find vertex remapping with generation-counter staleness
//! - Face-flip rejection (no inverted triangle normals)
//! - Locked-boundary support
//!
//! Author: Moroya Sakamoto

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::collections::BinaryHeap;

use glam::DVec3;
use rayon::prelude::*;

use crate::cluster::Cluster;
use crate::types::Vertex;

/// Cost assigned to a locked-locked edge; popping one of these ends the
/// collapse loop
const LOCKED_COST: f64 = 1e30;

/// Pop-side terminate threshold, slightly below the sentinel so float
/// noise cannot sneak a locked pair through
const TERMINATE_COST: f64 = 1e29;

/// 4x4 symmetric matrix for quadric error computation
///
/// Stored as the upper triangle:
/// ```text
/// [a00 a01 a02 a03]
/// [    a11 a12 a13]
/// [        a22 a23]
/// [            a33]
/// ```
#[derive(Debug, Clone, Copy, Default)]
struct Quadric {
    data: [f64; 10],
}

impl Quadric {
    /// Quadric of the plane `ax + by + cz + d = 0`, scaled by `weight`
    fn from_plane(a: f64, b: f64, c: f64, d: f64, weight: f64) -> Self {
        let mut q = Quadric {
            data: [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ],
        };
        for v in &mut q.data {
            *v *= weight;
        }
        q
    }

    #[inline]
    fn add(&self, other: &Quadric) -> Quadric {
        let mut result = Quadric::default();
        for i in 0..10 {
            result.data[i] = self.data[i] + other.data[i];
        }
        result
    }

    /// Evaluate `v^T Q v` for `v = [x, y, z, 1]`
    #[inline]
    fn evaluate(&self, p: DVec3) -> f64 {
        let d = &self.data;
        let (x, y, z) = (p.x, p.y, p.z);
        x * x * d[0]
            + 2.0 * x * y * d[1]
            + 2.0 * x * z * d[2]
            + 2.0 * x * d[3]
            + y * y * d[4]
            + 2.0 * y * z * d[5]
            + 2.0 * y * d[6]
            + z * z * d[7]
            + 2.0 * z * d[8]
            + d[9]
    }

    /// Solve for the position minimizing the error
    ///
    /// Returns `None` when the upper-left 3x3 system is singular.
    fn solve_optimal(&self) -> Option<DVec3> {
        let d = &self.data;
        let (a00, a01, a02, a03) = (d[0], d[1], d[2], d[3]);
        let (a11, a12, a13) = (d[4], d[5], d[6]);
        let (a22, a23) = (d[7], d[8]);

        let det = a00 * (a11 * a22 - a12 * a12) - a01 * (a01 * a22 - a12 * a02)
            + a02 * (a01 * a12 - a11 * a02);
        if det.abs() < 1e-12 {
            return None;
        }

        let inv_det = 1.0 / det;
        let b = DVec3::new(-a03, -a13, -a23);
        // Cramer's rule on the symmetric 3x3
        let x = (b.x * (a11 * a22 - a12 * a12) - a01 * (b.y * a22 - a12 * b.z)
            + a02 * (b.y * a12 - a11 * b.z))
            * inv_det;
        let y = (a00 * (b.y * a22 - a12 * b.z) - b.x * (a01 * a22 - a12 * a02)
            + a02 * (a01 * b.z - b.y * a02))
            * inv_det;
        let z = (a00 * (a11 * b.z - b.y * a12) - a01 * (a01 * b.z - b.y * a02)
            + b.x * (a01 * a12 - a11 * a02))
            * inv_det;
        Some(DVec3::new(x, y, z))
    }
}

/// Edge collapse candidate in the priority queue
///
/// Heap entries are immutable; a candidate invalidated by a later
/// collapse is detected at pop time through the root-identity and
/// generation checks and discarded.
#[derive(Debug)]
struct EdgeCollapse {
    v0: u32,
    v1: u32,
    cost: f64,
    optimal_pos: DVec3,
    /// `gen[v0] + gen[v1]` at construction time
    generation: u32,
}

impl PartialEq for EdgeCollapse {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for EdgeCollapse {}

impl PartialOrd for EdgeCollapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCollapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse ordering; NaN sorts as worst (largest)
        match (self.cost.is_nan(), other.cost.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => other
                .cost
                .partial_cmp(&self.cost)
                .unwrap_or(Ordering::Equal),
        }
    }
}

/// Union-find lookup with path compression
#[inline]
fn find_root(remap: &mut [u32], mut v: u32) -> u32 {
    while remap[v as usize] != v {
        remap[v as usize] = remap[remap[v as usize] as usize];
        v = remap[v as usize];
    }
    v
}

/// Undirected edge key over local vertex indices
#[inline]
fn edge_key(a: u32, b: u32) -> u64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    ((lo as u64) << 32) | hi as u64
}

/// Build the collapse candidate for the edge (v0, v1)
fn compute_collapse(
    v0: u32,
    v1: u32,
    vertices: &[Vertex],
    quadrics: &[Quadric],
    locked: &[bool],
    gen: &[u32],
) -> EdgeCollapse {
    let generation = gen[v0 as usize] + gen[v1 as usize];
    let p0 = vertices[v0 as usize].position.as_dvec3();
    let p1 = vertices[v1 as usize].position.as_dvec3();

    // Both locked: unusable, parks at the bottom of the heap
    if locked[v0 as usize] && locked[v1 as usize] {
        return EdgeCollapse {
            v0,
            v1,
            cost: LOCKED_COST,
            optimal_pos: p0,
            generation,
        };
    }

    let combined = quadrics[v0 as usize].add(&quadrics[v1 as usize]);

    if !locked[v0 as usize] && !locked[v1 as usize] {
        if let Some(optimal) = combined.solve_optimal() {
            return EdgeCollapse {
                v0,
                v1,
                cost: combined.evaluate(optimal).max(0.0),
                optimal_pos: optimal,
                generation,
            };
        }
    }

    // Fallback: evaluate the endpoints and midpoint, honoring locks
    let mid = (p0 + p1) * 0.5;
    let c0 = combined.evaluate(p0);
    let c1 = combined.evaluate(p1);
    let cm = if locked[v0 as usize] || locked[v1 as usize] {
        LOCKED_COST
    } else {
        combined.evaluate(mid)
    };

    let (cost, optimal_pos) = if locked[v0 as usize] {
        (c0, p0)
    } else if locked[v1 as usize] {
        (c1, p1)
    } else if c0 <= c1 && c0 <= cm {
        (c0, p0)
    } else if c1 <= cm {
        (c1, p1)
    } else {
        (cm, mid)
    };

    EdgeCollapse {
        v0,
        v1,
        cost: cost.max(0.0),
        optimal_pos,
        generation,
    }
}

/// Reduce a cluster toward `target_num_tris` triangles
///
/// Returns the geometric error introduced: the square root of the
/// largest quadric cost accepted during collapsing, interpreted as a
/// distance. Returns 0.0 when the cluster is already within target.
///
/// With `lock_boundary` set, every vertex incident to a boundary edge
/// keeps its exact position; collapses between two locked vertices are
/// never performed. The reduction silently stops short of the target
/// when no legal collapse remains - a less-reduced cluster is always
/// preferable to a failed build.
pub fn simplify_cluster(cluster: &mut Cluster, target_num_tris: u32, lock_boundary: bool) -> f32 {
    if cluster.num_tris <= target_num_tris {
        return 0.0;
    }

    let num_verts = cluster.vertices.len();
    let num_tris = cluster.num_tris as usize;

    // --- Per-vertex quadrics from triangle planes, area-weighted ---
    let indices = &cluster.indices;
    let vertices = &cluster.vertices;
    let face_quadrics: Vec<Option<(u32, u32, u32, Quadric)>> = (0..num_tris)
        .into_par_iter()
        .map(|t| {
            let i0 = indices[t * 3];
            let i1 = indices[t * 3 + 1];
            let i2 = indices[t * 3 + 2];
            let p0 = vertices[i0 as usize].position.as_dvec3();
            let p1 = vertices[i1 as usize].position.as_dvec3();
            let p2 = vertices[i2 as usize].position.as_dvec3();

            let cross = (p1 - p0).cross(p2 - p0);
            let len = cross.length();
            if len < 1e-12 {
                return None; // zero-area triangles contribute nothing
            }
            let n = cross / len;
            let d = -n.dot(p0);
            Some((i0, i1, i2, Quadric::from_plane(n.x, n.y, n.z, d, len * 0.5)))
        })
        .collect();

    let mut quadrics = vec![Quadric::default(); num_verts];
    for fq in face_quadrics.iter().flatten() {
        let (i0, i1, i2, q) = fq;
        quadrics[*i0 as usize] = quadrics[*i0 as usize].add(q);
        quadrics[*i1 as usize] = quadrics[*i1 as usize].add(q);
        quadrics[*i2 as usize] = quadrics[*i2 as usize].add(q);
    }

    // --- Locked vertices from boundary edges ---
    let mut locked = vec![false; num_verts];
    if lock_boundary && !cluster.boundary_edges.is_empty() {
        for t in 0..num_tris {
            for e in 0..3 {
                if cluster.boundary_edges[t * 3 + e] {
                    locked[cluster.indices[t * 3 + e] as usize] = true;
                    locked[cluster.indices[t * 3 + (e + 1) % 3] as usize] = true;
                }
            }
        }
    }

    // --- Union-find, generations, liveness, adjacency ---
    let mut remap: Vec<u32> = (0..num_verts as u32).collect();
    let mut gen = vec![0u32; num_verts];
    let mut tri_alive = vec![true; num_tris];
    let mut current_tris = cluster.num_tris;

    let mut vert_tris: Vec<Vec<u32>> = vec![Vec::new(); num_verts];
    for t in 0..num_tris {
        for v in 0..3 {
            vert_tris[cluster.indices[t * 3 + v] as usize].push(t as u32);
        }
    }

    // --- Initial candidates, one per undirected edge ---
    let mut heap = BinaryHeap::new();
    let mut edges_seen: HashSet<u64> = HashSet::new();
    for t in 0..num_tris {
        let tri = [
            cluster.indices[t * 3],
            cluster.indices[t * 3 + 1],
            cluster.indices[t * 3 + 2],
        ];
        for e in 0..3 {
            let (a, b) = (tri[e], tri[(e + 1) % 3]);
            if edges_seen.insert(edge_key(a, b)) {
                heap.push(compute_collapse(
                    a,
                    b,
                    &cluster.vertices,
                    &quadrics,
                    &locked,
                    &gen,
                ));
            }
        }
    }

    // --- Collapse loop ---
    let mut max_error = 0.0f64;

    while current_tris > target_num_tris {
        let ec = match heap.pop() {
            Some(ec) => ec,
            None => break,
        };

        let rv0 = find_root(&mut remap, ec.v0);
        let rv1 = find_root(&mut remap, ec.v1);
        if rv0 == rv1 {
            continue; // already collapsed together
        }
        if ec.v0 != rv0 || ec.v1 != rv1 {
            continue; // stale: an endpoint is no longer a root
        }
        if ec.generation != gen[rv0 as usize] + gen[rv1 as usize] {
            continue; // stale: a neighbor changed underneath
        }

        // Only locked-locked pairs remain
        if ec.cost >= TERMINATE_COST {
            break;
        }

        // Face-flip test: no surviving triangle may invert. Triangles
        // containing both endpoints collapse and are exempt.
        let mut flip_detected = false;
        'flip: for &(source, other) in &[(rv1, rv0), (rv0, rv1)] {
            for ti in 0..vert_tris[source as usize].len() {
                let t = vert_tris[source as usize][ti] as usize;
                if !tri_alive[t] {
                    continue;
                }
                let r = [
                    find_root(&mut remap, cluster.indices[t * 3]),
                    find_root(&mut remap, cluster.indices[t * 3 + 1]),
                    find_root(&mut remap, cluster.indices[t * 3 + 2]),
                ];
                if r[0] == r[1] || r[1] == r[2] || r[0] == r[2] {
                    continue;
                }
                if r.contains(&other) {
                    continue;
                }

                let before = [
                    cluster.vertices[r[0] as usize].position.as_dvec3(),
                    cluster.vertices[r[1] as usize].position.as_dvec3(),
                    cluster.vertices[r[2] as usize].position.as_dvec3(),
                ];
                let mut after = before;
                for (k, &root) in r.iter().enumerate() {
                    if root == source {
                        after[k] = ec.optimal_pos;
                    }
                }
                let nb = (before[1] - before[0]).cross(before[2] - before[0]);
                let na = (after[1] - after[0]).cross(after[2] - after[0]);
                if nb.dot(na) < 0.0 {
                    flip_detected = true;
                    break 'flip;
                }
            }
        }
        if flip_detected {
            continue; // rejected; never re-queued
        }

        // --- Perform the collapse: rv1 into rv0 ---
        max_error = max_error.max(ec.cost);

        cluster.vertices[rv0 as usize].position = ec.optimal_pos.as_vec3();
        cluster.vertices[rv0 as usize].normal = (cluster.vertices[rv0 as usize].normal
            + cluster.vertices[rv1 as usize].normal)
            .normalize_or_zero();
        if locked[rv1 as usize] {
            locked[rv0 as usize] = true;
        }
        quadrics[rv0 as usize] = quadrics[rv0 as usize].add(&quadrics[rv1 as usize]);

        remap[rv1 as usize] = rv0;
        gen[rv0 as usize] += 1;

        // Transfer rv1's triangles (duplicates tolerated, filtered at read)
        let moved = std::mem::take(&mut vert_tris[rv1 as usize]);
        vert_tris[rv0 as usize].extend(moved);

        // Rewrite indices through the union-find, killing degenerates
        for ti in 0..vert_tris[rv0 as usize].len() {
            let t = vert_tris[rv0 as usize][ti] as usize;
            if !tri_alive[t] {
                continue;
            }
            for v in 0..3 {
                cluster.indices[t * 3 + v] = find_root(&mut remap, cluster.indices[t * 3 + v]);
            }
            let (i0, i1, i2) = (
                cluster.indices[t * 3],
                cluster.indices[t * 3 + 1],
                cluster.indices[t * 3 + 2],
            );
            if i0 == i1 || i1 == i2 || i0 == i2 {
                tri_alive[t] = false;
                current_tris -= 1;
            }
        }

        // Fresh candidates toward every neighbor root. Ordered set so
        // heap insertion order (and equal-cost pop order) stays
        // deterministic.
        let mut neighbors: BTreeSet<u32> = BTreeSet::new();
        for ti in 0..vert_tris[rv0 as usize].len() {
            let t = vert_tris[rv0 as usize][ti] as usize;
            if !tri_alive[t] {
                continue;
            }
            for v in 0..3 {
                let nv = find_root(&mut remap, cluster.indices[t * 3 + v]);
                if nv != rv0 {
                    neighbors.insert(nv);
                }
            }
        }
        for &nv in &neighbors {
            heap.push(compute_collapse(
                rv0,
                nv,
                &cluster.vertices,
                &quadrics,
                &locked,
                &gen,
            ));
        }
    }

    // --- Compact: live triangles only, first-touch vertex dedup ---
    let mut new_verts: Vec<Vertex> = Vec::new();
    let mut new_indices: Vec<u32> = Vec::new();
    let mut compact_map: HashMap<u32, u32> = HashMap::new();

    for t in 0..num_tris {
        if !tri_alive[t] {
            continue;
        }
        let mut tri = [0u32; 3];
        for v in 0..3 {
            let root = find_root(&mut remap, cluster.indices[t * 3 + v]);
            tri[v] = *compact_map.entry(root).or_insert_with(|| {
                let idx = new_verts.len() as u32;
                new_verts.push(cluster.vertices[root as usize]);
                idx
            });
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            continue;
        }
        new_indices.extend_from_slice(&tri);
    }

    cluster.vertices = new_verts;
    cluster.indices = new_indices;
    cluster.compute_bounds_and_metrics();
    cluster.compute_boundary_edges();

    max_error.max(0.0).sqrt() as f32
}
