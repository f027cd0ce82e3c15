//! Line-oriented command dispatch. Each line is `<command> <args...>`,
//! split on whitespace except where a command documents otherwise (e.g.
//! `insert-chunk` takes the chunk's text as the remainder of the line so
//! it may contain spaces).

use crate::{parse_index_params, parse_metric, parse_vector};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use vstore_core::{ChunkId, LibraryId};
use vstore_engine::VectorDb;

const HELP: &str = "\
commands:
  create-library <name> <dim> <metric:cosine|euclidean|dot> <index:hnsw|lsh|kdtree>
  list-libraries
  get-library <library-id>
  delete-library <library-id>
  rebuild-index <library-id>
  insert-chunk <library-id> <v1,v2,...> <content...>
  get-chunk <library-id> <chunk-id>
  list-chunks <library-id>
  delete-chunk <library-id> <chunk-id>
  search <library-id> <k> <v1,v2,...>
  snapshot
  help
  quit";

pub fn run_interactive(db: &VectorDb) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print!("> ");
    let _ = stdout.flush();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if matches!(line.trim(), "quit" | "exit") {
            break;
        }
        run_line(db, &line, &mut stdout);
        print!("> ");
        let _ = stdout.flush();
    }
}

pub fn run_line(db: &VectorDb, line: &str, out: &mut impl Write) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    let result = dispatch(db, cmd, rest, out);
    if let Err(e) = result {
        let _ = writeln!(out, "error: {e}");
    }
}

fn parse_uuid_arg(s: &str) -> Result<uuid::Uuid, String> {
    s.parse().map_err(|_| format!("not a valid id: {s:?}"))
}

fn dispatch(db: &VectorDb, cmd: &str, rest: &str, out: &mut impl Write) -> Result<(), String> {
    match cmd {
        "help" => {
            let _ = writeln!(out, "{HELP}");
            Ok(())
        }
        "create-library" => {
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            let &[name, dim, metric, index] = tokens.as_slice() else {
                return Err("usage: create-library <name> <dim> <metric> <index>".into());
            };
            let dim: usize = dim.parse().map_err(|_| "dim must be a positive integer".to_string())?;
            let metric = parse_metric(metric)?;
            let params = parse_index_params(index)?;
            let lib = db
                .create_library(name.to_string(), String::new(), dim, metric, params, BTreeMap::new())
                .map_err(|e| e.to_string())?;
            let _ = writeln!(out, "created library {} ({})", lib.id, lib.name);
            Ok(())
        }
        "list-libraries" => {
            let page = db.list_libraries(None, 1000).map_err(|e| e.to_string())?;
            for lib in page.items {
                let _ = writeln!(out, "{}  {}  dim={}  {:?}", lib.id, lib.name, lib.dim, lib.metric);
            }
            Ok(())
        }
        "get-library" => {
            let id = LibraryId(parse_uuid_arg(rest)?);
            let lib = db.get_library(id).map_err(|e| e.to_string())?;
            let _ = writeln!(out, "{}  {}  dim={}  {:?}", lib.id, lib.name, lib.dim, lib.metric);
            Ok(())
        }
        "delete-library" => {
            let id = LibraryId(parse_uuid_arg(rest)?);
            db.delete_library(id).map_err(|e| e.to_string())?;
            let _ = writeln!(out, "deleted {id}");
            Ok(())
        }
        "rebuild-index" => {
            let id = LibraryId(parse_uuid_arg(rest)?);
            db.rebuild_index(id).map_err(|e| e.to_string())?;
            let _ = writeln!(out, "rebuilt index for {id}");
            Ok(())
        }
        "insert-chunk" => {
            let mut tokens = rest.splitn(3, char::is_whitespace);
            let lib_id = tokens.next().ok_or("usage: insert-chunk <library-id> <vector> <content>")?;
            let vector = tokens.next().ok_or("usage: insert-chunk <library-id> <vector> <content>")?;
            let content = tokens.next().unwrap_or_default();
            let id = LibraryId(parse_uuid_arg(lib_id)?);
            let embedding = parse_vector(vector)?;
            let chunk = db
                .insert_chunk(id, content.to_string(), embedding, None, None, BTreeMap::new())
                .map_err(|e| e.to_string())?;
            let _ = writeln!(out, "inserted chunk {}", chunk.id);
            Ok(())
        }
        "get-chunk" => {
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            let &[lib_id, chunk_id] = tokens.as_slice() else {
                return Err("usage: get-chunk <library-id> <chunk-id>".into());
            };
            let lib_id = LibraryId(parse_uuid_arg(lib_id)?);
            let chunk_id = ChunkId(parse_uuid_arg(chunk_id)?);
            let chunk = db.get_chunk(lib_id, chunk_id).map_err(|e| e.to_string())?;
            let _ = writeln!(out, "{}  {:?}", chunk.id, chunk.content);
            Ok(())
        }
        "list-chunks" => {
            let id = LibraryId(parse_uuid_arg(rest)?);
            let page = db.list_chunks(id, None, None, 1000).map_err(|e| e.to_string())?;
            for chunk in page.items {
                let _ = writeln!(out, "{}  {:?}", chunk.id, chunk.content);
            }
            Ok(())
        }
        "delete-chunk" => {
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            let &[lib_id, chunk_id] = tokens.as_slice() else {
                return Err("usage: delete-chunk <library-id> <chunk-id>".into());
            };
            let lib_id = LibraryId(parse_uuid_arg(lib_id)?);
            let chunk_id = ChunkId(parse_uuid_arg(chunk_id)?);
            db.delete_chunk(lib_id, chunk_id).map_err(|e| e.to_string())?;
            let _ = writeln!(out, "deleted {chunk_id}");
            Ok(())
        }
        "search" => {
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            let &[lib_id, k, vector] = tokens.as_slice() else {
                return Err("usage: search <library-id> <k> <vector>".into());
            };
            let id = LibraryId(parse_uuid_arg(lib_id)?);
            let k: usize = k.parse().map_err(|_| "k must be a non-negative integer".to_string())?;
            let embedding = parse_vector(vector)?;
            let hits = db.search(id, embedding.as_slice(), k, None).map_err(|e| e.to_string())?;
            for hit in hits {
                let _ = writeln!(out, "{}  distance={:.6}", hit.chunk_id, hit.distance);
            }
            Ok(())
        }
        "snapshot" => {
            db.snapshot_now().map_err(|e| e.to_string())?;
            let _ = writeln!(out, "snapshot taken");
            Ok(())
        }
        other => Err(format!("unknown command {other:?}; type 'help' for a list")),
    }
}
