use crate::db::VectorDb;
use std::collections::BTreeMap;
use tempfile::tempdir;
use vstore_core::{Chunk, Embedding, Filter, HnswParams, IndexParams, Metric, MetadataValue, Predicate, VdbError, WalSyncMode};

fn open(dir: &std::path::Path) -> VectorDb {
    VectorDb::open_fresh(dir, WalSyncMode::Strict).unwrap()
}

#[test]
fn create_then_get_library_round_trips() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let lib = db
        .create_library(
            "docs".into(),
            "".into(),
            3,
            Metric::Cosine,
            IndexParams::Hnsw(HnswParams::default()),
            BTreeMap::new(),
        )
        .unwrap();

    let fetched = db.get_library(lib.id).unwrap();
    assert_eq!(fetched.name, "docs");
    assert_eq!(fetched.dim, 3);
}

#[test]
fn duplicate_library_name_is_rejected() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    db.create_library("docs".into(), "".into(), 3, Metric::Cosine, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
        .unwrap();
    let result = db.create_library("docs".into(), "".into(), 3, Metric::Cosine, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new());
    assert!(result.is_err());
}

#[test]
fn insert_and_search_finds_nearest_chunk() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let lib = db
        .create_library("docs".into(), "".into(), 2, Metric::Euclidean, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
        .unwrap();

    let near = db
        .insert_chunk(lib.id, "near".into(), Embedding::new(vec![0.0, 0.0]).unwrap(), None, None, BTreeMap::new())
        .unwrap();
    db.insert_chunk(lib.id, "far".into(), Embedding::new(vec![100.0, 100.0]).unwrap(), None, None, BTreeMap::new())
        .unwrap();

    let hits = db.search(lib.id, &[0.1, 0.1], 1, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, near.id);
}

#[test]
fn search_respects_metadata_filter() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let lib = db
        .create_library("docs".into(), "".into(), 2, Metric::Euclidean, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
        .unwrap();

    let mut tagged = BTreeMap::new();
    tagged.insert("lang".to_string(), MetadataValue::Str("en".into()));
    let keep = db
        .insert_chunk(lib.id, "a".into(), Embedding::new(vec![0.0, 0.0]).unwrap(), None, None, tagged)
        .unwrap();

    let mut other = BTreeMap::new();
    other.insert("lang".to_string(), MetadataValue::Str("fr".into()));
    db.insert_chunk(lib.id, "b".into(), Embedding::new(vec![0.01, 0.01]).unwrap(), None, None, other)
        .unwrap();

    let filter = Filter::Pred(Predicate::Eq {
        key: "lang".into(),
        value: MetadataValue::Str("en".into()),
    });
    let hits = db.search(lib.id, &[0.0, 0.0], 5, Some(&filter)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, keep.id);
}

#[test]
fn delete_chunk_removes_it_from_future_searches() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let lib = db
        .create_library("docs".into(), "".into(), 2, Metric::Euclidean, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
        .unwrap();
    let chunk = db
        .insert_chunk(lib.id, "a".into(), Embedding::new(vec![0.0, 0.0]).unwrap(), None, None, BTreeMap::new())
        .unwrap();

    db.delete_chunk(lib.id, chunk.id).unwrap();
    let hits = db.search(lib.id, &[0.0, 0.0], 5, None).unwrap();
    assert!(hits.is_empty());
    assert!(db.get_chunk(lib.id, chunk.id).is_err());
}

#[test]
fn rebuild_index_keeps_results_after_many_deletes() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let lib = db
        .create_library("docs".into(), "".into(), 2, Metric::Euclidean, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
        .unwrap();

    let mut ids = Vec::new();
    for i in 0..10 {
        let c = db
            .insert_chunk(lib.id, format!("c{i}"), Embedding::new(vec![i as f64, 0.0]).unwrap(), None, None, BTreeMap::new())
            .unwrap();
        ids.push(c.id);
    }
    for id in &ids[..5] {
        db.delete_chunk(lib.id, *id).unwrap();
    }

    db.rebuild_index(lib.id).unwrap();
    let hits = db.search(lib.id, &[9.0, 0.0], 1, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, *ids.last().unwrap());
}

#[test]
fn insert_chunks_bulk_inserts_every_chunk() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let lib = db
        .create_library("docs".into(), "".into(), 2, Metric::Euclidean, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
        .unwrap();

    let chunks: Vec<Chunk> = (0..5)
        .map(|i| Chunk::new(lib.id, format!("c{i}"), Embedding::new(vec![i as f64, 0.0]).unwrap(), None, None, BTreeMap::new()))
        .collect();
    let inserted = db.insert_chunks_bulk(lib.id, chunks).unwrap();
    assert_eq!(inserted.len(), 5);

    let page = db.list_chunks(lib.id, None, None, 100).unwrap();
    assert_eq!(page.items.len(), 5);
}

#[test]
fn insert_chunks_bulk_rejects_duplicate_ids_within_the_batch_atomically() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let lib = db
        .create_library("docs".into(), "".into(), 2, Metric::Euclidean, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
        .unwrap();

    let dup = Chunk::new(lib.id, "a".into(), Embedding::new(vec![0.0, 0.0]).unwrap(), None, None, BTreeMap::new());
    let mut clone = dup.clone();
    clone.content = "b".into();
    let chunks = vec![dup, clone];

    let result = db.insert_chunks_bulk(lib.id, chunks);
    assert!(matches!(result, Err(VdbError::InvalidArgument(_))));

    let page = db.list_chunks(lib.id, None, None, 100).unwrap();
    assert!(page.items.is_empty(), "a rejected batch must leave no partial writes");
}

#[test]
fn heterogeneous_multi_search_is_rejected() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let a = db
        .create_library("a".into(), "".into(), 2, Metric::Euclidean, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
        .unwrap();
    let b = db
        .create_library("b".into(), "".into(), 3, Metric::Euclidean, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
        .unwrap();

    let result = db.multi_search(&[a.id, b.id], &[0.0, 0.0], 5, None);
    assert!(matches!(result, Err(vstore_core::VdbError::HeterogeneousLibraries)));
}

#[test]
fn crash_recovery_replays_wal_onto_fresh_instance() {
    let dir = tempdir().unwrap();
    let lib_id;
    let chunk_id;
    {
        let db = open(dir.path());
        let lib = db
            .create_library("docs".into(), "".into(), 2, Metric::Euclidean, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
            .unwrap();
        lib_id = lib.id;
        let chunk = db
            .insert_chunk(lib.id, "hello".into(), Embedding::new(vec![1.0, 2.0]).unwrap(), None, None, BTreeMap::new())
            .unwrap();
        chunk_id = chunk.id;
    }

    let config = vstore_core::DbConfig {
        data_dir: dir.path().to_path_buf(),
        wal_sync_mode: WalSyncMode::Strict,
        ..vstore_core::DbConfig::default()
    };
    let recovered = VectorDb::open(&config).unwrap();
    let chunk = recovered.get_chunk(lib_id, chunk_id).unwrap();
    assert_eq!(chunk.content, "hello");
}

#[test]
fn snapshot_then_recovery_skips_replaying_truncated_wal() {
    let dir = tempdir().unwrap();
    let lib_id;
    {
        let db = open(dir.path());
        let lib = db
            .create_library("docs".into(), "".into(), 2, Metric::Euclidean, IndexParams::Hnsw(HnswParams::default()), BTreeMap::new())
            .unwrap();
        lib_id = lib.id;
        for i in 0..5 {
            db.insert_chunk(lib.id, format!("c{i}"), Embedding::new(vec![i as f64, 0.0]).unwrap(), None, None, BTreeMap::new())
                .unwrap();
        }
        db.snapshot_now().unwrap();
    }

    let config = vstore_core::DbConfig {
        data_dir: dir.path().to_path_buf(),
        wal_sync_mode: WalSyncMode::Strict,
        ..vstore_core::DbConfig::default()
    };
    let recovered = VectorDb::open(&config).unwrap();
    let page = recovered.list_chunks(lib_id, None, None, 100).unwrap();
    assert_eq!(page.items.len(), 5);
}
