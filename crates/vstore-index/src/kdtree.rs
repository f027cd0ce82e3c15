use crate::trait_def::VectorIndex;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roaring::RoaringBitmap;
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use vstore_core::{KdTreeParams, Metric, VdbError, VdbResult};

/// Up to 4 ids fit inline before a leaf's id list spills to the heap; most
/// leaves hold `leaf_size` entries (commonly 16), so this only avoids an
/// allocation for the common near-empty-leaf case during incremental
/// inserts.
type LeafIds = SmallVec<[u64; 4]>;

enum NodeKind {
    Leaf { ids: LeafIds },
    Split {
        axis: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

struct TreeNode {
    kind: NodeKind,
    /// Axis-aligned bounding box of this subtree in projected space,
    /// `(min, max)` per projected axis. Used for the lower-bound distance
    /// test during best-first search.
    bounds: Vec<(f64, f64)>,
}

/// KD-tree over a Gaussian random projection of the original vectors:
/// median-split on the axis of maximum variance, best-first k-NN guided by
/// a lower-bound distance to each node's bounding box in projected space,
/// but scored by exact distance in the original space.
pub struct KdTreeIndex {
    dim: usize,
    projected_dim: usize,
    metric: Metric,
    leaf_size: usize,
    projection: Vec<Vec<f64>>, // projected_dim x dim, orthonormal rows
    vectors: HashMap<u64, Vec<f64>>,
    projected: HashMap<u64, Vec<f64>>,
    tombstones: RoaringBitmap,
    root: Option<TreeNode>,
}

impl KdTreeIndex {
    pub fn new(dim: usize, metric: Metric, params: KdTreeParams) -> Self {
        let projected_dim = params.projected_dim.unwrap_or_else(|| dim.min(16)).max(1);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let projection = orthonormal_projection(&mut rng, projected_dim, dim);
        Self {
            dim,
            projected_dim,
            metric,
            leaf_size: params.leaf_size.max(1),
            projection,
            vectors: HashMap::new(),
            projected: HashMap::new(),
            tombstones: RoaringBitmap::new(),
            root: None,
        }
    }

    fn project(&self, v: &[f64]) -> Vec<f64> {
        self.projection
            .iter()
            .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
            .collect()
    }

    pub fn tombstone_ratio(&self) -> f64 {
        if self.vectors.is_empty() {
            return 0.0;
        }
        self.tombstones.len() as f64 / self.vectors.len() as f64
    }

    fn build_tree(&self, ids: Vec<u64>) -> TreeNode {
        let bounds = bounding_box(&ids, &self.projected, self.projected_dim);
        if ids.len() <= self.leaf_size {
            return TreeNode {
                kind: NodeKind::Leaf {
                    ids: ids.into_iter().collect(),
                },
                bounds,
            };
        }

        let axis = max_variance_axis(&ids, &self.projected, self.projected_dim);
        let mut sorted = ids;
        sorted.sort_by(|a, b| {
            let pa = self.projected[a][axis];
            let pb = self.projected[b][axis];
            pa.partial_cmp(&pb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(b))
        });
        let mid = sorted.len() / 2;
        let threshold = self.projected[&sorted[mid]][axis];
        let right_ids = sorted.split_off(mid);
        let left_ids = sorted;

        TreeNode {
            kind: NodeKind::Split {
                axis,
                threshold,
                left: Box::new(self.build_tree(left_ids)),
                right: Box::new(self.build_tree(right_ids)),
            },
            bounds,
        }
    }

    /// Descends to `id`'s leaf, following each split's threshold, growing
    /// every bounding box passed along the way, and appends it there. A
    /// leaf that grows past `2 * leaf_size` is rebuilt in place from just
    /// its own ids — the incremental-insert path §4.7 describes, not a
    /// whole-tree rebuild.
    fn insert_into(&self, node: &mut TreeNode, id: u64) {
        let p = &self.projected[&id];
        for (axis, bound) in node.bounds.iter_mut().enumerate() {
            bound.0 = bound.0.min(p[axis]);
            bound.1 = bound.1.max(p[axis]);
        }
        match &mut node.kind {
            NodeKind::Leaf { ids } => {
                ids.push(id);
                if ids.len() > 2 * self.leaf_size {
                    let collected: Vec<u64> = ids.iter().copied().collect();
                    *node = self.build_tree(collected);
                }
            }
            NodeKind::Split { axis, threshold, left, right } => {
                if p[*axis] <= *threshold {
                    self.insert_into(left, id);
                } else {
                    self.insert_into(right, id);
                }
            }
        }
    }
}

fn orthonormal_projection(rng: &mut StdRng, projected_dim: usize, dim: usize) -> Vec<Vec<f64>> {
    // Gram-Schmidt over `projected_dim` random Gaussian rows of length
    // `dim`; orthonormalized so projected distances stay well-conditioned.
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(projected_dim);
    for _ in 0..projected_dim {
        let mut row: Vec<f64> = (0..dim).map(|_| sample_standard_normal(rng)).collect();
        for prev in &rows {
            let proj: f64 = row.iter().zip(prev).map(|(a, b)| a * b).sum();
            for i in 0..dim {
                row[i] -= proj * prev[i];
            }
        }
        let norm: f64 = row.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 1e-12 {
            for x in &mut row {
                *x /= norm;
            }
        }
        rows.push(row);
    }
    rows
}

fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn bounding_box(ids: &[u64], projected: &HashMap<u64, Vec<f64>>, dim: usize) -> Vec<(f64, f64)> {
    let mut bounds = vec![(f64::INFINITY, f64::NEG_INFINITY); dim];
    for id in ids {
        let p = &projected[id];
        for axis in 0..dim {
            bounds[axis].0 = bounds[axis].0.min(p[axis]);
            bounds[axis].1 = bounds[axis].1.max(p[axis]);
        }
    }
    bounds
}

fn max_variance_axis(ids: &[u64], projected: &HashMap<u64, Vec<f64>>, dim: usize) -> usize {
    let n = ids.len() as f64;
    let mut mean = vec![0.0; dim];
    for id in ids {
        let p = &projected[id];
        for axis in 0..dim {
            mean[axis] += p[axis];
        }
    }
    for m in &mut mean {
        *m /= n;
    }
    let mut variance = vec![0.0; dim];
    for id in ids {
        let p = &projected[id];
        for axis in 0..dim {
            let d = p[axis] - mean[axis];
            variance[axis] += d * d;
        }
    }
    variance
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(axis, _)| axis)
        .unwrap_or(0)
}

fn lower_bound_distance(query_proj: &[f64], bounds: &[(f64, f64)]) -> f64 {
    let mut sum_sq = 0.0;
    for axis in 0..bounds.len() {
        let (lo, hi) = bounds[axis];
        let q = query_proj[axis];
        let d = if q < lo {
            lo - q
        } else if q > hi {
            q - hi
        } else {
            0.0
        };
        sum_sq += d * d;
    }
    sum_sq.sqrt()
}

impl VectorIndex for KdTreeIndex {
    fn build(&mut self, vectors: &[(u64, Vec<f64>)]) -> VdbResult<()> {
        self.clear();
        for (id, v) in vectors {
            if v.len() != self.dim {
                return Err(VdbError::DimensionMismatch {
                    expected: self.dim,
                    got: v.len(),
                });
            }
            self.projected.insert(*id, self.project(v));
            self.vectors.insert(*id, v.clone());
        }
        let ids: Vec<u64> = self.vectors.keys().copied().collect();
        self.root = if ids.is_empty() {
            None
        } else {
            Some(self.build_tree(ids))
        };
        Ok(())
    }

    fn insert(&mut self, id: u64, vector: &[f64]) -> VdbResult<()> {
        if vector.len() != self.dim {
            return Err(VdbError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        self.vectors.insert(id, vector.to_vec());
        self.projected.insert(id, self.project(vector));
        self.tombstones.remove(id as u32);
        let mut root = self.root.take();
        match &mut root {
            None => root = Some(self.build_tree(vec![id])),
            Some(node) => self.insert_into(node, id),
        }
        self.root = root;
        Ok(())
    }

    fn remove(&mut self, id: u64) {
        self.tombstones.insert(id as u32);
    }

    fn search(&self, query: &[f64], k: usize, candidate_hint: usize) -> Vec<(u64, f64)> {
        let root = match &self.root {
            Some(r) => r,
            None => return Vec::new(),
        };
        let needed = k.max(candidate_hint).max(1);
        let query_proj = self.project(query);

        let mut frontier: BinaryHeap<Reverse<(OrderedFloat<f64>, usize)>> = BinaryHeap::new();
        let mut nodes: Vec<&TreeNode> = Vec::new();
        let push_node = |nodes: &mut Vec<&TreeNode>,
                         frontier: &mut BinaryHeap<Reverse<(OrderedFloat<f64>, usize)>>,
                         node: &TreeNode| {
            let lb = lower_bound_distance(&query_proj, &node.bounds);
            let id = nodes.len();
            nodes.push(node);
            frontier.push(Reverse((OrderedFloat(lb), id)));
        };
        push_node(&mut nodes, &mut frontier, root);

        let mut best: BinaryHeap<(OrderedFloat<f64>, u64)> = BinaryHeap::new();

        while let Some(Reverse((lb, node_id))) = frontier.pop() {
            if best.len() >= needed {
                if let Some((worst, _)) = best.peek() {
                    if lb.0 >= worst.0 {
                        break;
                    }
                }
            }
            match &nodes[node_id].kind {
                NodeKind::Leaf { ids } => {
                    for &id in ids.iter() {
                        if self.tombstones.contains(id as u32) {
                            continue;
                        }
                        let d = self.metric.distance(query, &self.vectors[&id]);
                        best.push((OrderedFloat(d), id));
                        if best.len() > needed {
                            best.pop();
                        }
                    }
                }
                NodeKind::Split { left, right, .. } => {
                    push_node(&mut nodes, &mut frontier, left);
                    push_node(&mut nodes, &mut frontier, right);
                }
            }
        }

        let mut result: Vec<(u64, f64)> = best.into_iter().map(|(d, id)| (id, d.0)).collect();
        result.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        result.truncate(k);
        result
    }

    fn len(&self) -> usize {
        self.vectors.len() - self.tombstones.len() as usize
    }

    fn clear(&mut self) {
        self.vectors.clear();
        self.projected.clear();
        self.tombstones.clear();
        self.root = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> KdTreeParams {
        KdTreeParams {
            leaf_size: 4,
            projected_dim: Some(4),
            seed: 7,
        }
    }

    #[test]
    fn finds_nearest_axis_vector() {
        let mut idx = KdTreeIndex::new(4, Metric::Euclidean, params());
        idx.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        idx.insert(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        idx.insert(3, &[10.0, 10.0, 10.0, 10.0]).unwrap();
        let results = idx.search(&[0.9, 0.1, 0.0, 0.0], 1, 0);
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn removed_ids_never_returned() {
        let mut idx = KdTreeIndex::new(4, Metric::Euclidean, params());
        for i in 0..30u64 {
            idx.insert(i, &[i as f64, 0.0, 0.0, 0.0]).unwrap();
        }
        idx.remove(3);
        let results = idx.search(&[3.0, 0.0, 0.0, 0.0], 30, 30);
        assert!(results.iter().all(|(id, _)| *id != 3));
    }

    #[test]
    fn empty_index_returns_empty() {
        let idx = KdTreeIndex::new(4, Metric::Euclidean, params());
        assert!(idx.search(&[0.0, 0.0, 0.0, 0.0], 5, 0).is_empty());
    }
}
