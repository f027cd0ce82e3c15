//! Query executor (§4.9): combines an index's candidate set with
//! metadata filtering and returns an ordered, deduplicated top-`k`.

use crate::library_store::LibraryStore;
use std::time::Instant;
use vstore_core::{ChunkId, Filter, FilterContext, LibraryId, Metric, VdbError, VdbResult};
use vstore_lock::{LockManager, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub distance: f64,
}

/// Default candidate multiplier: widen the pool 4x when a filter is
/// present (since some candidates will be rejected by it), 1x otherwise.
fn default_multiplier(filter: Option<&Filter>) -> usize {
    if filter.is_some() {
        4
    } else {
        1
    }
}

/// Runs one k-NN query against a single library (§4.9 steps 1-6).
pub fn search(
    store: &LibraryStore,
    locks: &LockManager,
    library_id: LibraryId,
    query: &[f64],
    k: usize,
    filter: Option<&Filter>,
    multiplier: Option<usize>,
    deadline: Instant,
) -> VdbResult<Vec<SearchHit>> {
    let mut session = locks.session();
    session.read(ResourceKind::Library, library_id.0, deadline)?;
    session.read(ResourceKind::Index, library_id.0, deadline)?;

    let record = store
        .get(library_id)
        .ok_or_else(|| VdbError::NotFound(format!("library {library_id}")))?;

    let dim = record.meta.read().dim;
    if query.len() != dim {
        return Err(VdbError::DimensionMismatch {
            expected: dim,
            got: query.len(),
        });
    }

    if k == 0 {
        return Ok(Vec::new());
    }

    let multiplier = multiplier.unwrap_or_else(|| default_multiplier(filter)).max(1);
    let work_cap = k.saturating_mul(16).max(k);
    let index = record.index.read();

    let mut hint = k.saturating_mul(multiplier).min(work_cap);
    let mut survivors: Vec<SearchHit> = Vec::new();
    loop {
        let candidates = index.search(query, hint.max(k), hint.max(k));
        let candidates_len = candidates.len();
        survivors.clear();
        for (internal_id, distance) in &candidates {
            if survivors.len() >= k {
                break;
            }
            let Some(chunk_id) = record.chunk_id_of(*internal_id) else {
                continue;
            };
            let Some(chunk) = record.chunks.get(&chunk_id) else {
                continue;
            };
            let passes = match filter {
                Some(f) => f.matches(&FilterContext {
                    metadata: &chunk.metadata,
                    document_id: chunk.document_id,
                }),
                None => true,
            };
            if passes {
                survivors.push(SearchHit {
                    chunk_id,
                    distance: *distance,
                });
            }
        }

        let exhausted_candidates = candidates_len < hint.max(k);
        let hit_work_cap = hint >= work_cap;
        if survivors.len() >= k || exhausted_candidates || hit_work_cap {
            break;
        }
        hint = (hint * 2).min(work_cap);
    }

    survivors.truncate(k);
    Ok(survivors)
}

/// Runs the same query across several libraries, unions and re-sorts by
/// distance (§4.9 "Cross-library search"). Every library must share `D`
/// and distance metric or the whole call is rejected.
pub fn multi_search(
    store: &LibraryStore,
    locks: &LockManager,
    library_ids: &[LibraryId],
    query: &[f64],
    k: usize,
    filter: Option<&Filter>,
    deadline: Instant,
) -> VdbResult<Vec<(LibraryId, SearchHit)>> {
    if library_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut expected: Option<(usize, Metric)> = None;
    for &id in library_ids {
        let record = store
            .get(id)
            .ok_or_else(|| VdbError::NotFound(format!("library {id}")))?;
        let meta = record.meta.read();
        let shape = (meta.dim, meta.metric);
        match expected {
            None => expected = Some(shape),
            Some(e) if e == shape => {}
            Some(_) => return Err(VdbError::HeterogeneousLibraries),
        }
    }

    let mut all: Vec<(LibraryId, SearchHit)> = Vec::new();
    for &id in library_ids {
        let hits = search(store, locks, id, query, k, filter, None, deadline)?;
        all.extend(hits.into_iter().map(|h| (id, h)));
    }
    all.sort_by(|a, b| {
        a.1.distance
            .partial_cmp(&b.1.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.chunk_id.cmp(&b.1.chunk_id))
    });
    all.truncate(k);
    Ok(all)
}
