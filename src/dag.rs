//! Cluster DAG construction
//!
//! Iterates group -> merge -> simplify -> split over the cluster levels
//! until a single root remains. Groups are the unit of joint
//! simplification and of DAG linkage: the parent clusters produced from
//! one group share its merged LOD sphere and error bit-exactly, which
//! is what makes runtime cuts crack-free.
//!
//! Per-group reduction inside one level fans out over `rayon`; results
//! are committed serially in group order, so cluster indices (and the
//! whole DAG) are deterministic for identical inputs.
//!
//! Author: Moroya Sakamoto

use rayon::prelude::*;

use crate::cluster::{build_leaf_clusters, merge_clusters, split_cluster, Cluster};
use crate::morton::morton_encode;
use crate::simplify::simplify_cluster;
use crate::types::{Aabb, BoundingSphere, BuildConfig, BuildError, RawMesh};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A set of sibling clusters that are simplified together
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterGroup {
    /// Clusters at this group's level that it aggregates
    pub children: Vec<u32>,
    /// Clusters one level up produced by reducing this group
    pub parent_clusters: Vec<u32>,
    /// Sphere enclosing the children's sphere bounds
    pub bounds: BoundingSphere,
    /// Sphere enclosing the children's LOD spheres; inherited by every
    /// parent cluster
    pub lod_bounds: BoundingSphere,
    /// Error bound of the parent clusters; never below any child's
    /// `lod_error`
    pub parent_lod_error: f32,
    /// Level of the children
    pub mip_level: u32,
    /// True iff no group exists above this one
    pub is_root: bool,
}

impl Default for ClusterGroup {
    fn default() -> Self {
        ClusterGroup {
            children: Vec::new(),
            parent_clusters: Vec::new(),
            bounds: BoundingSphere::default(),
            lod_bounds: BoundingSphere::default(),
            parent_lod_error: 0.0,
            mip_level: 0,
            is_root: false,
        }
    }
}

/// The finished cluster hierarchy
///
/// Flat arenas linked by `u32` indices; append-only during the build,
/// read-only afterwards. Indices are stable for the DAG's lifetime.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterDag {
    /// All clusters across all levels
    pub clusters: Vec<Cluster>,
    /// All groups across all levels
    pub groups: Vec<ClusterGroup>,
    /// AABB of the input mesh
    pub total_bounds: Aabb,
}

impl ClusterDag {
    /// Build the full DAG for a raw mesh
    ///
    /// Validates the input first; nothing is published on error. An
    /// empty mesh yields an empty DAG with zero roots.
    pub fn build(mesh: &RawMesh, config: &BuildConfig) -> Result<ClusterDag, BuildError> {
        mesh.validate()?;

        let mut dag = ClusterDag {
            clusters: Vec::new(),
            groups: Vec::new(),
            total_bounds: mesh.bounds,
        };

        if mesh.num_tris() == 0 || !mesh.bounds.valid() {
            return Ok(dag);
        }

        let mut current_level = build_leaf_clusters(mesh, &mut dag.clusters, config);

        while current_level.len() > 1 {
            let current_tris: u32 = current_level
                .iter()
                .map(|&ci| dag.clusters[ci as usize].num_tris)
                .sum();

            let group_indices = dag.group_clusters(&current_level, config);

            // Reduce every group of this level in parallel; each
            // reduction only reads the cluster store. Committing in
            // group order afterwards assigns final indices serially.
            let reductions: Vec<Option<(Vec<Cluster>, f32)>> = group_indices
                .par_iter()
                .map(|&gi| dag.reduce_group_geometry(gi, config))
                .collect();

            let mut next_level: Vec<u32> = Vec::new();
            for (&gi, reduction) in group_indices.iter().zip(reductions) {
                if let Some((parents, error)) = reduction {
                    dag.commit_group_parents(gi, parents, error, &mut next_level);
                }
            }

            if next_level.is_empty() {
                // Cannot reduce further: promote the remaining level
                // clusters as their own root groups
                for &ci in &current_level {
                    let cluster = &dag.clusters[ci as usize];
                    dag.groups.push(ClusterGroup {
                        children: vec![ci],
                        parent_clusters: vec![ci],
                        bounds: cluster.sphere_bounds,
                        lod_bounds: cluster.lod_bounds,
                        parent_lod_error: cluster.lod_error,
                        mip_level: cluster.mip_level,
                        is_root: true,
                    });
                }
                break;
            }

            if next_level.len() <= 1 {
                // A single parent ends the iteration; its generating
                // groups become the roots
                for &gi in &group_indices {
                    dag.groups[gi as usize].is_root = true;
                }
                break;
            }

            let next_tris: u32 = next_level
                .iter()
                .map(|&ci| dag.clusters[ci as usize].num_tris)
                .sum();
            if next_tris >= current_tris {
                // Reduction stalled: a locked perimeter can floor the
                // triangle count above the cluster budget. Cap the DAG
                // here instead of iterating forever.
                for &gi in &group_indices {
                    dag.groups[gi as usize].is_root = true;
                }
                break;
            }

            current_level = next_level;
        }

        // A one-cluster input never entered the loop; synthesize its root
        if current_level.len() == 1 && dag.groups.is_empty() {
            let ci = current_level[0];
            let cluster = &dag.clusters[ci as usize];
            dag.groups.push(ClusterGroup {
                children: vec![ci],
                parent_clusters: vec![ci],
                bounds: cluster.sphere_bounds,
                lod_bounds: cluster.lod_bounds,
                parent_lod_error: cluster.lod_error,
                mip_level: cluster.mip_level,
                is_root: true,
            });
        }

        Ok(dag)
    }

    /// Gather one level's clusters into groups of
    /// `min_group_size..=max_group_size`, spatially sorted
    ///
    /// Small levels become a single group. Larger levels are sorted by
    /// the Morton code of each cluster's AABB center, normalized to the
    /// whole mesh bounds (not per level, so grouping stays stable as
    /// levels shrink), and cut into contiguous runs.
    fn group_clusters(&mut self, level: &[u32], config: &BuildConfig) -> Vec<u32> {
        let count = level.len() as u32;
        if count == 0 {
            return Vec::new();
        }

        if count <= config.max_group_size {
            let gi = self.groups.len() as u32;
            let group = self.make_group(level, gi);
            self.groups.push(group);
            return vec![gi];
        }

        let bounds_min = self.total_bounds.min;
        let bounds_size = self.total_bounds.normalization_size();
        let mut sorted: Vec<(u32, u32)> = level
            .iter()
            .map(|&ci| {
                let center = self.clusters[ci as usize].bounds.center();
                let normalized = (center - bounds_min) / bounds_size;
                (ci, morton_encode(normalized))
            })
            .collect();
        sorted.sort_by_key(|&(_, code)| code);

        // Spread the remainder across runs instead of leaving a tiny tail
        let num_full_groups = (count / config.max_group_size).max(1);
        let adjusted_size = (count / num_full_groups).max(config.min_group_size);

        let mut group_indices = Vec::new();
        let mut start = 0u32;
        while start < count {
            let remaining = count - start;
            let mut group_size = adjusted_size;
            if remaining <= config.max_group_size || remaining < group_size + config.min_group_size
            {
                group_size = remaining;
            }

            let members: Vec<u32> = sorted[start as usize..(start + group_size) as usize]
                .iter()
                .map(|&(ci, _)| ci)
                .collect();

            let gi = self.groups.len() as u32;
            let group = self.make_group(&members, gi);
            self.groups.push(group);
            group_indices.push(gi);
            start += group_size;
        }

        group_indices
    }

    /// Create a group over `children`, assigning their `group_index`
    fn make_group(&mut self, children: &[u32], group_index: u32) -> ClusterGroup {
        let mut group = ClusterGroup {
            children: children.to_vec(),
            mip_level: self.clusters[children[0] as usize].mip_level,
            ..Default::default()
        };

        let mut child_spheres = Vec::with_capacity(children.len());
        let mut child_lod_spheres = Vec::with_capacity(children.len());
        for &ci in children {
            let cluster = &self.clusters[ci as usize];
            child_spheres.push(cluster.sphere_bounds);
            child_lod_spheres.push(cluster.lod_bounds);
            group.parent_lod_error = group.parent_lod_error.max(cluster.lod_error);
        }
        group.bounds = BoundingSphere::from_spheres(&child_spheres);
        group.lod_bounds = BoundingSphere::from_spheres(&child_lod_spheres);

        for &ci in children {
            self.clusters[ci as usize].group_index = group_index;
        }
        group
    }

    /// Merge, simplify and split one group; pure with respect to the
    /// stores, so groups of one level can run in parallel
    ///
    /// Returns the parent clusters (without DAG metadata yet) and the
    /// group's final error bound, or `None` for a group with no
    /// geometry.
    fn reduce_group_geometry(
        &self,
        group_index: u32,
        config: &BuildConfig,
    ) -> Option<(Vec<Cluster>, f32)> {
        let group = &self.groups[group_index as usize];
        if group.children.is_empty() {
            return None;
        }
        let total_tris: u32 = group
            .children
            .iter()
            .map(|&ci| self.clusters[ci as usize].num_tris)
            .sum();
        if total_tris == 0 {
            return None;
        }

        let mut merged = merge_clusters(&self.clusters, &group.children);

        let target_tris = (total_tris / 2).max(1).max(config.min_cluster_size);
        let simplify_error = simplify_cluster(&mut merged, target_tris, true);

        // Monotonically non-decreasing error up the hierarchy, and
        // never zero so the traversal always has something to compare
        let mut parent_lod_error = group.parent_lod_error.max(simplify_error);
        if parent_lod_error <= 0.0 {
            parent_lod_error = (merged.edge_length * 0.01).max(1e-6);
        }

        let parents = split_cluster(merged, config);
        Some((parents, parent_lod_error))
    }

    /// Append one group's parent clusters to the store, wiring the DAG
    /// metadata: parents inherit the group's LOD sphere and error
    fn commit_group_parents(
        &mut self,
        group_index: u32,
        parents: Vec<Cluster>,
        parent_lod_error: f32,
        next_level: &mut Vec<u32>,
    ) {
        self.groups[group_index as usize].parent_lod_error = parent_lod_error;
        let parent_mip = self.groups[group_index as usize].mip_level + 1;
        let lod_bounds = self.groups[group_index as usize].lod_bounds;

        for mut pc in parents {
            pc.mip_level = parent_mip;
            pc.lod_error = parent_lod_error;
            pc.lod_bounds = lod_bounds;
            pc.generating_group_index = group_index;

            let cluster_index = self.clusters.len() as u32;
            self.clusters.push(pc);
            self.groups[group_index as usize]
                .parent_clusters
                .push(cluster_index);
            next_level.push(cluster_index);
        }
    }

    /// Indices of all root groups (zero only for an empty DAG)
    pub fn root_group_indices(&self) -> Vec<u32> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.is_root)
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Cluster count per mip level, index 0 = leaves
    pub fn cluster_count_per_level(&self) -> Vec<u32> {
        let max_level = self.max_mip_level();
        if self.clusters.is_empty() {
            return Vec::new();
        }
        let mut counts = vec![0u32; max_level as usize + 1];
        for c in &self.clusters {
            counts[c.mip_level as usize] += 1;
        }
        counts
    }

    /// Highest mip level present (0 for a leaf-only DAG)
    pub fn max_mip_level(&self) -> u32 {
        self.clusters.iter().map(|c| c.mip_level).max().unwrap_or(0)
    }
}
