use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info, warn};

use strata_core::error::{Result, StrataError};
use strata_core::traits::ContextSource;
use strata_core::types::DocumentSource;

/// A stored document with its chunk count.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub id: i64,
    pub filename: String,
    pub category: String,
    pub added_at: String,
    pub chunks: usize,
}

/// SQLite + FTS5 store for the vendor documentation that grounds analysis
/// prompts.
///
/// Documents are chunked on ingest and indexed with a porter tokenizer, so
/// queries hit inflected forms too. Retrieval is best effort: an empty
/// store yields empty context, not an error.
pub struct KnowledgeBase {
    conn: Mutex<Connection>,
    chunk_chars: usize,
    search_limit: usize,
}

impl KnowledgeBase {
    /// Open or create a knowledge base at the given path.
    pub fn open(path: &Path, chunk_chars: usize, search_limit: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StrataError::Knowledge(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| StrataError::Knowledge(e.to_string()))?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StrataError::Knowledge(e.to_string()))?;

        Self::initialize(&conn)?;

        debug!(path = %path.display(), "Knowledge base opened");
        Ok(Self {
            conn: Mutex::new(conn),
            chunk_chars,
            search_limit,
        })
    }

    /// Open an in-memory knowledge base (for testing).
    pub fn in_memory(chunk_chars: usize, search_limit: usize) -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StrataError::Knowledge(e.to_string()))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            chunk_chars,
            search_limit,
        })
    }

    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                category TEXT NOT NULL,
                added_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(id),
                seq INTEGER NOT NULL,
                content TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, seq);

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                content,
                document_id UNINDEXED,
                content_rowid=id,
                tokenize='porter unicode61'
            );

            CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, content, document_id)
                VALUES (new.id, new.content, new.document_id);
            END;

            CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
                DELETE FROM chunks_fts WHERE rowid = old.id;
            END;",
        )
        .map_err(|e| StrataError::Knowledge(e.to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StrataError::Knowledge(e.to_string()))
    }

    /// Ingest one file. Returns the number of chunks indexed.
    pub fn ingest_file(&self, path: &Path, category: &str) -> Result<usize> {
        let text = std::fs::read_to_string(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.ingest_text(&filename, category, &text)
    }

    /// Ingest raw text under a filename. Returns the number of chunks indexed.
    pub fn ingest_text(&self, filename: &str, category: &str, text: &str) -> Result<usize> {
        let chunks = chunk_text(text, self.chunk_chars);
        if chunks.is_empty() {
            return Err(StrataError::Knowledge(format!(
                "document has no indexable content: {}",
                filename
            )));
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| StrataError::Knowledge(e.to_string()))?;

        tx.execute(
            "INSERT INTO documents (filename, category, added_at) VALUES (?1, ?2, ?3)",
            params![filename, category, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StrataError::Knowledge(e.to_string()))?;
        let document_id = tx.last_insert_rowid();

        for (seq, chunk) in chunks.iter().enumerate() {
            tx.execute(
                "INSERT INTO chunks (document_id, seq, content) VALUES (?1, ?2, ?3)",
                params![document_id, seq as i64, chunk],
            )
            .map_err(|e| StrataError::Knowledge(e.to_string()))?;
        }

        tx.commit().map_err(|e| StrataError::Knowledge(e.to_string()))?;

        info!(file = filename, category, chunks = chunks.len(), "Document ingested");
        Ok(chunks.len())
    }

    /// Ingest every markdown/text file in a directory. Returns the number of
    /// documents ingested; unreadable files are skipped with a warning.
    pub fn ingest_dir(&self, dir: &Path, category: &str) -> Result<usize> {
        let mut ingested = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_doc = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e, "md" | "markdown" | "txt"))
                .unwrap_or(false);
            if !path.is_file() || !is_doc {
                continue;
            }
            match self.ingest_file(&path, category) {
                Ok(_) => ingested += 1,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable document");
                }
            }
        }
        Ok(ingested)
    }

    pub fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT d.id, d.filename, d.category, d.added_at, COUNT(c.id)
                 FROM documents d
                 LEFT JOIN chunks c ON c.document_id = d.id
                 GROUP BY d.id
                 ORDER BY d.id",
            )
            .map_err(|e| StrataError::Knowledge(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(DocumentInfo {
                    id: row.get(0)?,
                    filename: row.get(1)?,
                    category: row.get(2)?,
                    added_at: row.get(3)?,
                    chunks: row.get::<_, i64>(4)? as usize,
                })
            })
            .map_err(|e| StrataError::Knowledge(e.to_string()))?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row.map_err(|e| StrataError::Knowledge(e.to_string()))?);
        }
        Ok(documents)
    }

    /// Reduced document listing for report provenance.
    pub fn document_sources(&self) -> Result<Vec<DocumentSource>> {
        Ok(self
            .list_documents()?
            .into_iter()
            .map(|d| DocumentSource {
                id: d.id,
                filename: d.filename,
                category: d.category,
            })
            .collect())
    }

    /// Remove a document and its chunks. Returns false when the id is unknown.
    pub fn remove_document(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM chunks WHERE document_id = ?1", params![id])
            .map_err(|e| StrataError::Knowledge(e.to_string()))?;
        let removed = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(|e| StrataError::Knowledge(e.to_string()))?;
        Ok(removed > 0)
    }

    /// Full-text search over chunks, best match first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let Some(match_expr) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT content FROM chunks_fts
                 WHERE chunks_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(|e| StrataError::Knowledge(e.to_string()))?;

        let rows = stmt
            .query_map(params![match_expr, limit as i64], |row| row.get::<_, String>(0))
            .map_err(|e| StrataError::Knowledge(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| StrataError::Knowledge(e.to_string()))?);
        }
        Ok(results)
    }
}

impl ContextSource for KnowledgeBase {
    fn context_for(&self, query: String, max_chars: usize) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let chunks = self.search(&query, self.search_limit)?;
            let joined = chunks.join("\n\n---\n\n");
            Ok(truncate_chars(joined, max_chars))
        })
    }
}

/// Reduce free text to a disjunction of safe FTS5 barewords.
///
/// Version strings and prompt fragments carry characters the FTS5 query
/// parser treats as syntax, so everything non-alphanumeric becomes a
/// separator. Returns `None` when nothing searchable remains.
fn fts_query(raw: &str) -> Option<String> {
    let mut seen = HashSet::new();
    let terms: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .filter(|t| seen.insert(t.clone()))
        .take(24)
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Split text into chunks of roughly `chunk_chars` characters, preferring
/// paragraph boundaries.
fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let paragraph_len = paragraph.chars().count();

        if paragraph_len > chunk_chars {
            // Oversized paragraph: flush, then hard split on char boundaries.
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let mut piece = String::new();
            let mut piece_len = 0;
            for c in paragraph.chars() {
                piece.push(c);
                piece_len += 1;
                if piece_len >= chunk_chars {
                    chunks.push(std::mem::take(&mut piece));
                    piece_len = 0;
                }
            }
            if !piece.is_empty() {
                chunks.push(piece);
            }
            continue;
        }

        if !current.is_empty() && current_len + paragraph_len > chunk_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(paragraph);
        current_len += paragraph_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn truncate_chars(s: String, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s;
    }
    s.chars().take(max_chars).collect()
}
