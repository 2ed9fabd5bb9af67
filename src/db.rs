use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::model::{Character, ParseResult, Scene};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id                 INTEGER PRIMARY KEY,
            title              TEXT NOT NULL,
            original_file_name TEXT NOT NULL,
            file_path          TEXT UNIQUE NOT NULL,
            page_count         INTEGER NOT NULL,
            estimated_minutes  INTEGER NOT NULL,
            created_at         TEXT NOT NULL,
            last_opened_at     TEXT
        );

        CREATE TABLE IF NOT EXISTS bookmarks (
            id          INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            page_index  INTEGER NOT NULL,
            label       TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bookmarks_document ON bookmarks(document_id);

        CREATE TABLE IF NOT EXISTS notes (
            id          INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            kind        TEXT NOT NULL CHECK(kind IN ('freeform','highlight')),
            page_index  INTEGER NOT NULL,
            text        TEXT NOT NULL,
            rect        TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notes_document ON notes(document_id);

        -- Cached index of the latest parse
        CREATE TABLE IF NOT EXISTS scenes (
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            idx         INTEGER NOT NULL,
            heading     TEXT NOT NULL,
            start_page  INTEGER NOT NULL,
            end_page    INTEGER,
            PRIMARY KEY (document_id, idx)
        );

        CREATE TABLE IF NOT EXISTS characters (
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            first_page  INTEGER,
            PRIMARY KEY (document_id, name)
        );

        CREATE TABLE IF NOT EXISTS parse_runs (
            document_id INTEGER PRIMARY KEY REFERENCES documents(id) ON DELETE CASCADE,
            parsed_at   TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

// ── Documents ──

pub struct DocumentRow {
    pub id: i64,
    pub title: String,
    pub original_file_name: String,
    pub file_path: String,
    pub page_count: usize,
    pub estimated_minutes: usize,
    pub created_at: String,
    pub last_opened_at: Option<String>,
    pub indexed: bool,
}

/// Register a document. Importing the same path again keeps its id and
/// refreshes the page count.
pub fn insert_document(conn: &Connection, path: &Path, page_count: usize) -> Result<i64> {
    let file_path = path.to_string_lossy().to_string();
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.clone());
    let original_file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.clone());

    // One page ≈ one minute of screen time.
    let estimated_minutes = page_count;

    conn.execute(
        "INSERT INTO documents
         (title, original_file_name, file_path, page_count, estimated_minutes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(file_path) DO UPDATE SET
             page_count = excluded.page_count,
             estimated_minutes = excluded.estimated_minutes",
        params![title, original_file_name, file_path, page_count, estimated_minutes, now()],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM documents WHERE file_path = ?1",
        params![file_path],
        |r| r.get(0),
    )?;
    info!(id, title = %title, page_count, "document registered");
    Ok(id)
}

const DOCUMENT_COLUMNS: &str = "d.id, d.title, d.original_file_name, d.file_path, d.page_count,
     d.estimated_minutes, d.created_at, d.last_opened_at,
     EXISTS (SELECT 1 FROM parse_runs p WHERE p.document_id = d.id)";

fn document_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        title: row.get(1)?,
        original_file_name: row.get(2)?,
        file_path: row.get(3)?,
        page_count: row.get(4)?,
        estimated_minutes: row.get(5)?,
        created_at: row.get(6)?,
        last_opened_at: row.get(7)?,
        indexed: row.get(8)?,
    })
}

pub fn fetch_documents(conn: &Connection) -> Result<Vec<DocumentRow>> {
    let sql = format!(
        "SELECT {} FROM documents d ORDER BY COALESCE(d.last_opened_at, d.created_at) DESC, d.id",
        DOCUMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], document_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_document(conn: &Connection, id: i64) -> Result<Option<DocumentRow>> {
    let sql = format!("SELECT {} FROM documents d WHERE d.id = ?1", DOCUMENT_COLUMNS);
    let row = conn
        .query_row(&sql, params![id], document_from_row)
        .optional()?;
    Ok(row)
}

fn require_document(conn: &Connection, id: i64) -> Result<DocumentRow> {
    match fetch_document(conn, id)? {
        Some(doc) => Ok(doc),
        None => bail!("No document with id {}", id),
    }
}

pub fn touch_document(conn: &Connection, id: i64) -> Result<()> {
    let n = conn.execute(
        "UPDATE documents SET last_opened_at = ?1 WHERE id = ?2",
        params![now(), id],
    )?;
    if n == 0 {
        bail!("No document with id {}", id);
    }
    Ok(())
}

// ── Bookmarks ──

pub struct BookmarkRow {
    pub id: i64,
    pub page_index: usize,
    pub label: Option<String>,
    pub created_at: String,
}

pub fn add_bookmark(
    conn: &Connection,
    document_id: i64,
    page_index: usize,
    label: Option<&str>,
) -> Result<i64> {
    let doc = require_document(conn, document_id)?;
    if page_index >= doc.page_count {
        bail!(
            "Page {} is out of range ({} has {} pages)",
            page_index + 1,
            doc.title,
            doc.page_count
        );
    }
    conn.execute(
        "INSERT INTO bookmarks (document_id, page_index, label, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![document_id, page_index, label, now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn fetch_bookmarks(conn: &Connection, document_id: i64) -> Result<Vec<BookmarkRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, page_index, label, created_at FROM bookmarks
         WHERE document_id = ?1 ORDER BY page_index, id",
    )?;
    let rows = stmt
        .query_map(params![document_id], |row| {
            Ok(BookmarkRow {
                id: row.get(0)?,
                page_index: row.get(1)?,
                label: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Notes ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    Freeform,
    Highlight,
}

impl NoteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteKind::Freeform => "freeform",
            NoteKind::Highlight => "highlight",
        }
    }
}

impl FromSql for NoteKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "freeform" => Ok(NoteKind::Freeform),
            "highlight" => Ok(NoteKind::Highlight),
            other => Err(FromSqlError::Other(
                format!("unknown note kind {:?}", other).into(),
            )),
        }
    }
}

pub struct NoteRow {
    pub id: i64,
    pub kind: NoteKind,
    pub page_index: usize,
    pub text: String,
    /// Highlight rectangle as "x,y,w,h".
    pub rect: Option<String>,
    pub updated_at: String,
}

pub fn add_note(
    conn: &Connection,
    document_id: i64,
    page_index: usize,
    text: &str,
    kind: NoteKind,
    rect: Option<&str>,
) -> Result<i64> {
    require_document(conn, document_id)?;
    let ts = now();
    conn.execute(
        "INSERT INTO notes (document_id, kind, page_index, text, rect, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![document_id, kind.as_str(), page_index, text, rect, ts],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn fetch_notes(conn: &Connection, document_id: i64) -> Result<Vec<NoteRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, page_index, text, rect, updated_at FROM notes
         WHERE document_id = ?1 ORDER BY page_index, id",
    )?;
    let rows = stmt
        .query_map(params![document_id], |row| {
            Ok(NoteRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                page_index: row.get(2)?,
                text: row.get(3)?,
                rect: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Parse cache ──

/// Replace the cached index for a document with `result`.
pub fn save_parse_result(conn: &Connection, document_id: i64, result: &ParseResult) -> Result<()> {
    require_document(conn, document_id)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM scenes WHERE document_id = ?1", params![document_id])?;
    tx.execute("DELETE FROM characters WHERE document_id = ?1", params![document_id])?;
    {
        let mut s_stmt = tx.prepare(
            "INSERT INTO scenes (document_id, idx, heading, start_page, end_page)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for s in &result.scenes {
            s_stmt.execute(params![document_id, s.index, s.heading, s.start_page, s.end_page])?;
        }

        let mut c_stmt = tx.prepare(
            "INSERT INTO characters (document_id, name, first_page) VALUES (?1, ?2, ?3)",
        )?;
        for c in &result.characters {
            c_stmt.execute(params![document_id, c.name, c.first_page])?;
        }
    }
    tx.execute(
        "INSERT OR REPLACE INTO parse_runs (document_id, parsed_at) VALUES (?1, ?2)",
        params![document_id, now()],
    )?;
    tx.commit()?;
    debug!(
        document_id,
        scenes = result.scenes.len(),
        characters = result.characters.len(),
        "cached parse result"
    );
    Ok(())
}

/// `None` if the document was never indexed.
pub fn load_parse_result(conn: &Connection, document_id: i64) -> Result<Option<ParseResult>> {
    let parsed: Option<String> = conn
        .query_row(
            "SELECT parsed_at FROM parse_runs WHERE document_id = ?1",
            params![document_id],
            |r| r.get(0),
        )
        .optional()?;
    if parsed.is_none() {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "SELECT idx, heading, start_page, end_page FROM scenes
         WHERE document_id = ?1 ORDER BY idx",
    )?;
    let scenes = stmt
        .query_map(params![document_id], |row| {
            Ok(Scene {
                index: row.get(0)?,
                heading: row.get(1)?,
                start_page: row.get(2)?,
                end_page: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // Byte order, same as the indexer.
    let mut stmt = conn.prepare("SELECT name, first_page FROM characters WHERE document_id = ?1")?;
    let mut characters = stmt
        .query_map(params![document_id], |row| {
            Ok(Character {
                name: row.get(0)?,
                first_page: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    characters.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Some(ParseResult { scenes, characters }))
}

// ── Stats ──

pub struct Stats {
    pub documents: usize,
    pub indexed: usize,
    pub pages: usize,
    pub scenes: usize,
    pub characters: usize,
    pub bookmarks: usize,
    pub notes: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        documents: count("SELECT COUNT(*) FROM documents")?,
        indexed: count("SELECT COUNT(*) FROM parse_runs")?,
        pages: count("SELECT COALESCE(SUM(page_count), 0) FROM documents")?,
        scenes: count("SELECT COUNT(*) FROM scenes")?,
        characters: count("SELECT COUNT(*) FROM characters")?,
        bookmarks: count("SELECT COUNT(*) FROM bookmarks")?,
        notes: count("SELECT COUNT(*) FROM notes")?,
    })
}
