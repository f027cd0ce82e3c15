use crate::trait_def::VectorIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roaring::RoaringBitmap;
use std::collections::HashMap;
use vstore_core::{Metric, VdbError, VdbResult};

/// One random hyperplane, stored as a unit-length normal vector.
#[derive(Clone)]
struct Hyperplane(Vec<f64>);

impl Hyperplane {
    fn margin(&self, v: &[f64]) -> f64 {
        let mut dot = 0.0;
        for i in 0..v.len() {
            dot += self.0[i] * v[i];
        }
        dot
    }

    fn side(&self, v: &[f64]) -> bool {
        self.margin(v) >= 0.0
    }
}

type Signature = u64;

struct Table {
    hyperplanes: Vec<Hyperplane>,
    buckets: HashMap<Signature, Vec<u64>>,
}

impl Table {
    fn signature_of(&self, v: &[f64]) -> Signature {
        let mut sig: Signature = 0;
        for (bit, plane) in self.hyperplanes.iter().enumerate() {
            if plane.side(v) {
                sig |= 1 << bit;
            }
        }
        sig
    }

    /// This table's signature for `v`, plus its bits ordered from
    /// least-confident to most-confident (smallest `|⟨v, h⟩|` margin
    /// first) — the order Hamming-1 expansion should flip them in.
    fn signature_and_bit_order(&self, v: &[f64]) -> (Signature, Vec<usize>) {
        let mut sig: Signature = 0;
        let mut margins: Vec<(usize, f64)> = Vec::with_capacity(self.hyperplanes.len());
        for (bit, plane) in self.hyperplanes.iter().enumerate() {
            let margin = plane.margin(v);
            if margin >= 0.0 {
                sig |= 1 << bit;
            }
            margins.push((bit, margin.abs()));
        }
        margins.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        (sig, margins.into_iter().map(|(bit, _)| bit).collect())
    }
}

/// Random-hyperplane LSH: `L` tables of `K`-bit signatures, bucketed
/// by signature, with Hamming-1 neighbor-bucket expansion when the
/// candidate pool is too small.
pub struct LshIndex {
    dim: usize,
    metric: Metric,
    num_tables: usize,
    signature_bits: usize,
    tables: Vec<Table>,
    vectors: HashMap<u64, Vec<f64>>,
    tombstones: RoaringBitmap,
    expansion_budget: usize,
}

impl LshIndex {
    pub fn new(dim: usize, metric: Metric, num_tables: usize, signature_bits: usize, seed: u64) -> Self {
        assert!(signature_bits <= 63, "signature_bits must fit in a u64");
        let mut rng = StdRng::seed_from_u64(seed);
        let tables = (0..num_tables)
            .map(|_| {
                let hyperplanes = (0..signature_bits)
                    .map(|_| Hyperplane(random_unit_vector(&mut rng, dim)))
                    .collect();
                Table {
                    hyperplanes,
                    buckets: HashMap::new(),
                }
            })
            .collect();
        Self {
            dim,
            metric,
            num_tables,
            signature_bits,
            tables,
            vectors: HashMap::new(),
            tombstones: RoaringBitmap::new(),
            expansion_budget: 4,
        }
    }

    fn insert_into_tables(&mut self, id: u64, v: &[f64]) {
        for table_idx in 0..self.tables.len() {
            let sig = self.tables[table_idx].signature_of(v);
            self.compact_if_needed(table_idx, sig);
            self.tables[table_idx].buckets.entry(sig).or_default().push(id);
        }
    }

    /// Buckets whose tombstoned fraction crosses this ratio are rebuilt
    /// lazily the next time they are touched — here, on the next insert
    /// landing in the same bucket.
    fn compact_if_needed(&mut self, table_idx: usize, sig: Signature) {
        let tombstones = &self.tombstones;
        if let Some(bucket) = self.tables[table_idx].buckets.get_mut(&sig) {
            let tombstoned = bucket.iter().filter(|id| tombstones.contains(**id as u32)).count();
            if bucket.len() > 0 && tombstoned * 4 >= bucket.len() {
                bucket.retain(|id| !tombstones.contains(*id as u32));
            }
        }
    }
}

fn random_unit_vector(rng: &mut StdRng, dim: usize) -> Vec<f64> {
    let mut v: Vec<f64> = (0..dim).map(|_| sample_standard_normal(rng)).collect();
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    // Box-Muller transform; avoids pulling in rand_distr for one kernel.
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

impl VectorIndex for LshIndex {
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
        self.vectors.insert(id, vector.to_vec());
        self.insert_into_tables(id, vector);
        self.tombstones.remove(id as u32);
        Ok(())
    }

    fn remove(&mut self, id: u64) {
        self.tombstones.insert(id as u32);
    }

    fn search(&self, query: &[f64], k: usize, candidate_hint: usize) -> Vec<(u64, f64)> {
        if self.vectors.is_empty() {
            return Vec::new();
        }
        let needed = k.max(candidate_hint);
        let mut candidates: std::collections::HashSet<u64> = std::collections::HashSet::new();

        for table in &self.tables {
            let sig = table.signature_of(query);
            if let Some(bucket) = table.buckets.get(&sig) {
                for id in bucket {
                    if !self.tombstones.contains(*id as u32) {
                        candidates.insert(*id);
                    }
                }
            }
        }

        // Hamming-1 expansion: probe each table's neighbor buckets by
        // flipping its least-confident bit first, then its next-least
        // confident, and so on, until the budget is exhausted or enough
        // candidates are found.
        let mut expansions = 0;
        'expand: for table in &self.tables {
            if candidates.len() >= needed {
                break;
            }
            let (base_sig, bit_order) = table.signature_and_bit_order(query);
            for bit in bit_order {
                if candidates.len() >= needed || expansions >= self.expansion_budget {
                    break 'expand;
                }
                let flipped = base_sig ^ (1 << bit);
                if let Some(bucket) = table.buckets.get(&flipped) {
                    for id in bucket {
                        if !self.tombstones.contains(*id as u32) {
                            candidates.insert(*id);
                        }
                    }
                }
                expansions += 1;
            }
        }

        let mut scored: Vec<(u64, f64)> = candidates
            .into_iter()
            .filter_map(|id| {
                self.vectors
                    .get(&id)
                    .map(|v| (id, self.metric.distance(query, v)))
            })
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    fn len(&self) -> usize {
        self.vectors.len() - self.tombstones.len() as usize
    }

    fn clear(&mut self) {
        self.vectors.clear();
        self.tombstones.clear();
        for table in &mut self.tables {
            table.buckets.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_search_returns_self() {
        let mut idx = LshIndex::new(8, Metric::Cosine, 4, 6, 42);
        idx.insert(1, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        idx.insert(2, &[0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let results = idx.search(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 1, 1);
        assert_eq!(results.first().map(|(id, _)| *id), Some(1));
    }

    #[test]
    fn duplicate_vectors_all_recoverable() {
        let mut idx = LshIndex::new(8, Metric::Cosine, 4, 6, 7);
        let v = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        for id in 0..100u64 {
            idx.insert(id, &v).unwrap();
        }
        let results = idx.search(&v, 10, 10);
        assert_eq!(results.len(), 10);
        for (_, dist) in &results {
            assert!(dist.abs() < 1e-9);
        }
    }

    #[test]
    fn removed_ids_never_returned() {
        let mut idx = LshIndex::new(4, Metric::Euclidean, 2, 4, 1);
        idx.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        idx.insert(2, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        idx.remove(1);
        let results = idx.search(&[1.0, 0.0, 0.0, 0.0], 5, 5);
        assert!(results.iter().all(|(id, _)| *id != 1));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut idx = LshIndex::new(4, Metric::Euclidean, 2, 4, 1);
        assert!(idx.insert(1, &[1.0, 0.0]).is_err());
    }
}
