use crate::trait_def::VectorIndex;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roaring::RoaringBitmap;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use vstore_core::{HnswParams, Metric, VdbError, VdbResult};

struct Node {
    id: u64,
    vector: Vec<f64>,
    /// Adjacency list per layer, 0 (base layer) upward. Indices are
    /// positions into `HnswIndex::nodes`, not external ids.
    neighbors: Vec<Vec<usize>>,
}

/// Multi-layer proximity graph with greedy descent plus beam search,
/// built with the heuristic (diversity-pruning) neighbor-selection rule.
pub struct HnswIndex {
    dim: usize,
    metric: Metric,
    m: usize,
    m0: usize,
    ef_construction: usize,
    ef_search: usize,
    level_mult: f64,
    rng: StdRng,
    nodes: Vec<Node>,
    id_to_idx: HashMap<u64, usize>,
    tombstones: RoaringBitmap,
    entry_point: Option<usize>,
    entry_layer: usize,
}

impl HnswIndex {
    pub fn new(dim: usize, metric: Metric, params: HnswParams) -> Self {
        Self {
            dim,
            metric,
            m: params.m,
            m0: params.m * 2,
            ef_construction: params.ef_construction,
            ef_search: params.ef_search,
            level_mult: 1.0 / (params.m as f64).ln(),
            rng: StdRng::seed_from_u64(params.seed),
            nodes: Vec::new(),
            id_to_idx: HashMap::new(),
            tombstones: RoaringBitmap::new(),
            entry_point: None,
            entry_layer: 0,
        }
    }

    pub fn tombstone_ratio(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        self.tombstones.len() as f64 / self.nodes.len() as f64
    }

    fn tombstoned(&self, idx: usize) -> bool {
        self.tombstones.contains(self.nodes[idx].id as u32)
    }

    fn distance_to(&self, query: &[f64], idx: usize) -> f64 {
        self.metric.distance(query, &self.nodes[idx].vector)
    }

    fn random_level(&mut self) -> usize {
        let u: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        (-u.ln() * self.level_mult).floor() as usize
    }

    /// Beam search at a single layer starting from `entry_points`, keeping
    /// up to `ef` live (non-tombstoned) results. Tombstoned nodes are still
    /// explored for graph connectivity but never admitted to the result
    /// set, matching the removal contract in §4.6.
    fn search_layer(&self, query: &[f64], entry_points: &[usize], ef: usize, layer: usize) -> Vec<(f64, usize)> {
        let mut visited: HashSet<usize> = entry_points.iter().copied().collect();
        let mut candidates: BinaryHeap<Reverse<(OrderedFloat<f64>, usize)>> = BinaryHeap::new();
        let mut found: BinaryHeap<(OrderedFloat<f64>, usize)> = BinaryHeap::new();

        for &ep in entry_points {
            let d = self.distance_to(query, ep);
            candidates.push(Reverse((OrderedFloat(d), ep)));
            if !self.tombstoned(ep) {
                found.push((OrderedFloat(d), ep));
            }
        }

        while let Some(Reverse((dist, current))) = candidates.pop() {
            if let Some((worst, _)) = found.peek() {
                if found.len() >= ef && dist.0 > worst.0 {
                    break;
                }
            }
            if let Some(layer_neighbors) = self.nodes[current].neighbors.get(layer) {
                for &neighbor in layer_neighbors {
                    if !visited.insert(neighbor) {
                        continue;
                    }
                    let d = self.distance_to(query, neighbor);
                    let should_explore = found.len() < ef
                        || found.peek().map(|(worst, _)| d < worst.0).unwrap_or(true);
                    if should_explore {
                        candidates.push(Reverse((OrderedFloat(d), neighbor)));
                        if !self.tombstoned(neighbor) {
                            found.push((OrderedFloat(d), neighbor));
                            if found.len() > ef {
                                found.pop();
                            }
                        }
                    }
                }
            }
        }

        let mut result: Vec<(f64, usize)> = found.into_iter().map(|(d, idx)| (d.0, idx)).collect();
        result.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        result
    }

    /// Iteratively keep the closest remaining candidate that is closer to
    /// the target than to every neighbor already chosen (diversity
    /// pruning), capped at `m`.
    fn select_neighbors_heuristic(&self, mut candidates: Vec<(f64, usize)>, m: usize) -> Vec<usize> {
        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let mut selected: Vec<usize> = Vec::with_capacity(m);
        for (dist_to_target, candidate) in candidates {
            if selected.len() >= m {
                break;
            }
            let mut diverse = true;
            for &chosen in &selected {
                let d = self.metric.distance(&self.nodes[candidate].vector, &self.nodes[chosen].vector);
                if d < dist_to_target {
                    diverse = false;
                    break;
                }
            }
            if diverse {
                selected.push(candidate);
            }
        }
        selected
    }

    fn add_link(&mut self, node_idx: usize, new_idx: usize, layer: usize, cap: usize) {
        while self.nodes[node_idx].neighbors.len() <= layer {
            self.nodes[node_idx].neighbors.push(Vec::new());
        }
        self.nodes[node_idx].neighbors[layer].push(new_idx);
        if self.nodes[node_idx].neighbors[layer].len() > cap {
            let anchor = self.nodes[node_idx].vector.clone();
            let candidates: Vec<(f64, usize)> = self.nodes[node_idx].neighbors[layer]
                .iter()
                .map(|&n| (self.metric.distance(&anchor, &self.nodes[n].vector), n))
                .collect();
            let pruned = self.select_neighbors_heuristic(candidates, cap);
            self.nodes[node_idx].neighbors[layer] = pruned;
        }
    }
}

impl VectorIndex for HnswIndex {
    fn build(&mut self, vectors: &[(u64, Vec<f64>)]) -> VdbResult<()> {
        self.clear();
        for (id, v) in vectors {
            self.insert(*id, v)?;
        }
        Ok(())
    }

    fn insert(&mut self, id: u64, vector: &[f64]) -> VdbResult<()> {
        if vector.len() != self.dim {
            return Err(VdbError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        let level = self.random_level();
        let idx = self.nodes.len();
        self.nodes.push(Node {
            id,
            vector: vector.to_vec(),
            neighbors: vec![Vec::new(); level + 1],
        });
        self.id_to_idx.insert(id, idx);
        self.tombstones.remove(id as u32);

        let (entry_point, top_layer) = match self.entry_point {
            Some(ep) => (ep, self.entry_layer),
            None => {
                self.entry_point = Some(idx);
                self.entry_layer = level;
                return Ok(());
            }
        };

        let mut ep = entry_point;
        if top_layer > level {
            let mut cur_dist = self.distance_to(vector, ep);
            for layer in (level + 1..=top_layer).rev() {
                loop {
                    let mut moved = false;
                    if let Some(neighbors) = self.nodes[ep].neighbors.get(layer) {
                        for &n in neighbors {
                            let d = self.distance_to(vector, n);
                            if d < cur_dist {
                                cur_dist = d;
                                ep = n;
                                moved = true;
                            }
                        }
                    }
                    if !moved {
                        break;
                    }
                }
            }
        }

        let mut entry_points = vec![ep];
        for layer in (0..=level.min(top_layer)).rev() {
            let found = self.search_layer(vector, &entry_points, self.ef_construction, layer);
            let cap = if layer == 0 { self.m0 } else { self.m };
            let selected = self.select_neighbors_heuristic(found.clone(), cap);
            self.nodes[idx].neighbors[layer] = selected.clone();
            for &nbr in &selected {
                self.add_link(nbr, idx, layer, cap);
            }
            entry_points = if found.is_empty() {
                vec![ep]
            } else {
                found.into_iter().map(|(_, i)| i).collect()
            };
        }

        if level > top_layer {
            self.entry_point = Some(idx);
            self.entry_layer = level;
        }
        Ok(())
    }

    fn remove(&mut self, id: u64) {
        self.tombstones.insert(id as u32);
    }

    fn search(&self, query: &[f64], k: usize, candidate_hint: usize) -> Vec<(u64, f64)> {
        let ep = match self.entry_point {
            Some(ep) => ep,
            None => return Vec::new(),
        };
        let mut cur = ep;
        let mut cur_dist = self.distance_to(query, cur);
        for layer in (1..=self.entry_layer).rev() {
            loop {
                let mut moved = false;
                if let Some(neighbors) = self.nodes[cur].neighbors.get(layer) {
                    for &n in neighbors {
                        let d = self.distance_to(query, n);
                        if d < cur_dist {
                            cur_dist = d;
                            cur = n;
                            moved = true;
                        }
                    }
                }
                if !moved {
                    break;
                }
            }
        }

        let ef = self.ef_search.max(k).max(candidate_hint);
        let found = self.search_layer(query, &[cur], ef, 0);
        let mut results: Vec<(u64, f64)> = found
            .into_iter()
            .map(|(d, idx)| (self.nodes[idx].id, d))
            .collect();
        results.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(k);
        results
    }

    fn len(&self) -> usize {
        self.nodes.len() - self.tombstones.len() as usize
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.id_to_idx.clear();
        self.tombstones.clear();
        self.entry_point = None;
        self.entry_layer = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HnswParams {
        HnswParams {
            m: 8,
            ef_construction: 16,
            ef_search: 16,
            seed: 42,
        }
    }

    #[test]
    fn top1_identity_scenario() {
        let mut idx = HnswIndex::new(4, Metric::Cosine, params());
        idx.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        idx.insert(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        idx.insert(3, &[0.0, 0.0, 1.0, 0.0]).unwrap();
        idx.insert(4, &[0.0, 0.0, 0.0, 1.0]).unwrap();

        let results = idx.search(&[0.9, 0.1, 0.0, 0.0], 1, 0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn empty_index_search_is_empty() {
        let idx = HnswIndex::new(4, Metric::Cosine, params());
        assert!(idx.search(&[1.0, 0.0, 0.0, 0.0], 5, 0).is_empty());
    }

    #[test]
    fn removed_ids_are_never_returned() {
        let mut idx = HnswIndex::new(4, Metric::Euclidean, params());
        for i in 0..20u64 {
            idx.insert(i, &[i as f64, 0.0, 0.0, 0.0]).unwrap();
        }
        idx.remove(5);
        let results = idx.search(&[5.0, 0.0, 0.0, 0.0], 20, 20);
        assert!(results.iter().all(|(id, _)| *id != 5));
    }

    #[test]
    fn deterministic_given_identical_seed_and_order() {
        let vectors: Vec<(u64, Vec<f64>)> = (0..50)
            .map(|i| (i, vec![i as f64 * 0.1, (i as f64 * 0.37).sin(), 0.0, 0.0]))
            .collect();

        let mut a = HnswIndex::new(4, Metric::Euclidean, params());
        a.build(&vectors).unwrap();
        let mut b = HnswIndex::new(4, Metric::Euclidean, params());
        b.build(&vectors).unwrap();

        let query = [2.5, 0.1, 0.0, 0.0];
        assert_eq!(a.search(&query, 5, 0), b.search(&query, 5, 0));
    }

    #[test]
    fn rebuild_after_tombstones_drops_dead_ids() {
        let mut idx = HnswIndex::new(4, Metric::Euclidean, params());
        let vectors: Vec<(u64, Vec<f64>)> = (0..1000)
            .map(|i| (i, vec![i as f64, (i as f64).sqrt(), 0.0, 0.0]))
            .collect();
        idx.build(&vectors).unwrap();
        for i in 0..400u64 {
            idx.remove(i);
        }
        assert!(idx.tombstone_ratio() > 0.3);

        let live: Vec<(u64, Vec<f64>)> = vectors.into_iter().skip(400).collect();
        let mut rebuilt = HnswIndex::new(4, Metric::Euclidean, params());
        rebuilt.build(&live).unwrap();
        assert_eq!(rebuilt.len(), 600);

        let results = rebuilt.search(&[5.0, 2.0, 0.0, 0.0], 10, 10);
        assert!(results.iter().all(|(id, _)| *id >= 400));
    }
}
