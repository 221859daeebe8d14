//! Durable SQLite stores, with vector search via `sqlite-vec`.
//!
//! One database file holds the node store tables (`nodes`, `ref_docs`) and
//! the vector index table (`vectors`). [`open`] registers the `sqlite-vec`
//! extension, verifies it, creates the schema, and hands back both store
//! halves sharing one connection.
//!
//! Scores returned by [`SqliteVectorIndex::search`] are cosine similarities
//! computed as `1 - vec_distance_cosine(...)`, range `[-1, 1]`.

use std::mem::transmute;
use std::os::raw::c_char;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, OptionalExtension, ffi};

use crate::error::RagError;
use crate::nodes::{Metadata, Node, curate_metadata};

use super::{DocIdFilter, DocumentRef, NodeStore, ScoredId, VectorEntry, VectorIndex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id       TEXT PRIMARY KEY,
    doc_id   TEXT NOT NULL,
    text     TEXT NOT NULL,
    window   TEXT NOT NULL,
    prev_id  TEXT,
    next_id  TEXT,
    metadata TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS nodes_doc_id ON nodes(doc_id);
CREATE TABLE IF NOT EXISTS ref_docs (
    doc_id   TEXT PRIMARY KEY,
    metadata TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS vectors (
    node_id   TEXT PRIMARY KEY,
    doc_id    TEXT NOT NULL,
    metadata  TEXT NOT NULL,
    embedding BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS vectors_doc_id ON vectors(doc_id);
";

/// Connection and query failures surface as [`RagError::StoreUnavailable`];
/// serialization failures keep [`RagError::Storage`] via the `From` impl.
fn unavailable(err: impl ToString) -> RagError {
    RagError::StoreUnavailable(err.to_string())
}

/// Open both store halves against the database at `path`.
///
/// Fails when the file cannot be opened or the `sqlite-vec` extension is
/// unavailable; [`super::open_stores`] treats that as the signal to fall
/// back to the in-memory stores.
pub async fn open(path: &str) -> Result<(SqliteNodeStore, SqliteVectorIndex), RagError> {
    register_vec_extension()?;
    let conn = Connection::open(path).await.map_err(unavailable)?;
    conn.call(|conn| {
        // Confirm the extension actually loaded before touching the schema.
        conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
            .map_err(tokio_rusqlite::Error::Rusqlite)?;
        conn.execute_batch(SCHEMA)
            .map_err(tokio_rusqlite::Error::Rusqlite)?;
        Ok(())
    })
    .await
    .map_err(unavailable)?;

    let node_store = SqliteNodeStore { conn: conn.clone() };
    let vector_index = SqliteVectorIndex { conn };
    Ok((node_store, vector_index))
}

/// Register `sqlite-vec` as an auto-extension for every new connection.
///
/// SQLite's auto-extension list is process-global, so this runs once and
/// every later registration call observes the recorded outcome.
fn register_vec_extension() -> Result<(), RagError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(RagError::StoreUnavailable)
}

fn metadata_to_json(metadata: &Metadata) -> String {
    serde_json::Value::Object(metadata.clone()).to_string()
}

fn metadata_from_json(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Durable [`NodeStore`] backed by the `nodes` and `ref_docs` tables.
#[derive(Clone)]
pub struct SqliteNodeStore {
    conn: Connection,
}

#[async_trait]
impl NodeStore for SqliteNodeStore {
    async fn put_nodes(&self, nodes: Vec<Node>) -> Result<(), RagError> {
        if nodes.is_empty() {
            return Ok(());
        }
        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                for node in &nodes {
                    tx.execute(
                        "INSERT OR REPLACE INTO nodes \
                         (id, doc_id, text, window, prev_id, next_id, metadata) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        (
                            &node.id,
                            &node.ref_doc_id,
                            &node.text,
                            &node.window,
                            &node.prev_id,
                            &node.next_id,
                            metadata_to_json(&node.metadata),
                        ),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    tx.execute(
                        "INSERT OR IGNORE INTO ref_docs (doc_id, metadata) VALUES (?1, ?2)",
                        (
                            &node.ref_doc_id,
                            metadata_to_json(&curate_metadata(node.metadata.clone())),
                        ),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(unavailable)
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<Node>, RagError> {
        let node_id = node_id.to_string();
        self.conn
            .call(move |conn| {
                let node = conn
                    .query_row(
                        "SELECT id, doc_id, text, window, prev_id, next_id, metadata \
                         FROM nodes WHERE id = ?1",
                        [&node_id],
                        |row| {
                            Ok(Node {
                                id: row.get(0)?,
                                ref_doc_id: row.get(1)?,
                                text: row.get(2)?,
                                window: row.get(3)?,
                                prev_id: row.get(4)?,
                                next_id: row.get(5)?,
                                metadata: metadata_from_json(&row.get::<_, String>(6)?),
                            })
                        },
                    )
                    .optional()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(node)
            })
            .await
            .map_err(unavailable)
    }

    async fn all_document_refs(&self) -> Result<Vec<DocumentRef>, RagError> {
        self.conn
            .call(|conn| {
                let mut doc_stmt = conn
                    .prepare("SELECT doc_id, metadata FROM ref_docs ORDER BY rowid")
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let docs = doc_stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut node_stmt = conn
                    .prepare("SELECT id FROM nodes WHERE doc_id = ?1 ORDER BY rowid")
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut refs = Vec::with_capacity(docs.len());
                for (doc_id, metadata) in docs {
                    let node_ids = node_stmt
                        .query_map([&doc_id], |row| row.get::<_, String>(0))
                        .map_err(tokio_rusqlite::Error::Rusqlite)?
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    refs.push(DocumentRef {
                        doc_id,
                        node_ids,
                        metadata: metadata_from_json(&metadata),
                    });
                }
                Ok(refs)
            })
            .await
            .map_err(unavailable)
    }

    async fn delete_document_refs(&self, doc_id: &str) -> Result<usize, RagError> {
        let doc_id = doc_id.to_string();
        self.conn
            .call(move |conn| {
                let deleted = conn
                    .execute("DELETE FROM nodes WHERE doc_id = ?1", [&doc_id])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                conn.execute("DELETE FROM ref_docs WHERE doc_id = ?1", [&doc_id])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(deleted)
            })
            .await
            .map_err(unavailable)
    }
}

/// Durable [`VectorIndex`] backed by the `vectors` table.
#[derive(Clone)]
pub struct SqliteVectorIndex {
    conn: Connection,
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<(), RagError> {
        if entries.is_empty() {
            return Ok(());
        }
        // Serialize embeddings up front so the closure only does SQL work.
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let embedding_json = serde_json::to_string(&entry.embedding)?;
            rows.push((
                entry.node_id,
                entry.doc_id,
                metadata_to_json(&entry.metadata),
                embedding_json,
            ));
        }
        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                for (node_id, doc_id, metadata, embedding_json) in &rows {
                    tx.execute(
                        "INSERT OR REPLACE INTO vectors (node_id, doc_id, metadata, embedding) \
                         VALUES (?1, ?2, ?3, vec_f32(?4))",
                        (node_id, doc_id, metadata, embedding_json),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(unavailable)
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&DocIdFilter>,
    ) -> Result<Vec<ScoredId>, RagError> {
        let embedding_json = serde_json::to_string(query)?;
        // OR-of-equality doc filter, passed as a JSON array so one prepared
        // statement covers every filter width.
        let filter_json = match filter {
            Some(filter) => Some(serde_json::to_string(&filter.doc_ids)?),
            None => None,
        };
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT node_id, vec_distance_cosine(embedding, vec_f32(?1)) AS distance \
                         FROM vectors \
                         WHERE ?2 IS NULL OR doc_id IN (SELECT value FROM json_each(?2)) \
                         ORDER BY distance ASC, rowid ASC \
                         LIMIT ?3",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map((&embedding_json, &filter_json, top_k as i64), |row| {
                        let node_id: String = row.get(0)?;
                        let distance: f64 = row.get(1)?;
                        Ok(ScoredId {
                            node_id,
                            // Cosine distance to cosine similarity.
                            score: (1.0 - distance) as f32,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(rows)
            })
            .await
            .map_err(unavailable)
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<usize, RagError> {
        let doc_id = doc_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM vectors WHERE doc_id = ?1", [&doc_id])
                    .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(unavailable)
    }

    async fn close(&self) -> Result<(), RagError> {
        self.conn.clone().close().await.map_err(unavailable)
    }
}
