mod db;
mod extract;
mod model;
mod parser;
mod settings;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use regex::RegexBuilder;
use tracing::{info, warn};

use model::{Character, ParseResult, Scene};
use parser::ScriptParser;
use settings::Settings;

#[derive(Parser)]
#[command(name = "scene_index", about = "Scene and character index for screenplay text")]
struct Cli {
    /// SQLite library path (overrides SCENE_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Max pages read per document (overrides SCENE_MAX_PAGES)
    #[arg(long, global = true)]
    max_pages: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add scripts (pdftotext output) to the library
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Build the scene and character index for scripts
    Index {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        /// Don't cache results in the library
        #[arg(long)]
        no_save: bool,
    },
    /// List cached scenes of a document
    Scenes {
        id: i64,
        /// Case-insensitive regex on the heading
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// List cached characters of a document
    Characters { id: i64 },
    /// Page bookmarks
    Bookmark {
        #[command(subcommand)]
        action: BookmarkAction,
    },
    /// Reader notes
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },
    /// List documents in the library
    Library,
    /// Show library statistics
    Stats,
}

#[derive(Subcommand)]
enum BookmarkAction {
    Add {
        id: i64,
        /// 1-based page number
        page: usize,
        #[arg(short, long)]
        label: Option<String>,
    },
    List { id: i64 },
}

#[derive(Subcommand)]
enum NoteAction {
    Add {
        id: i64,
        /// 1-based page number
        page: usize,
        text: String,
        /// Store as a highlight instead of a freeform note
        #[arg(long)]
        highlight: bool,
        /// Highlight rectangle "x,y,w,h"
        #[arg(long, requires = "highlight")]
        rect: Option<String>,
    },
    List { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::from_env()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if let Some(n) = cli.max_pages {
        settings.max_pages = n;
    }
    info!(db = %settings.db_path.display(), max_pages = settings.max_pages, "settings loaded");

    match cli.command {
        Commands::Import { files } => {
            let conn = open_library(&settings)?;
            let mut imported = 0;
            for file in &files {
                match import_one(&conn, file) {
                    Ok(id) => {
                        imported += 1;
                        println!("#{:<4} {}", id, file.display());
                    }
                    Err(e) => warn!("Import failed for {}: {:#}", file.display(), e),
                }
            }
            println!("Imported {} of {} files.", imported, files.len());
            Ok(())
        }
        Commands::Index { files, json, no_save } => {
            run_index(&settings, &files, json, no_save).await
        }
        Commands::Scenes { id, filter } => {
            let conn = open_library(&settings)?;
            let parsed = load_cached(&conn, id)?;
            let re = filter
                .map(|f| RegexBuilder::new(&f).case_insensitive(true).build())
                .transpose()
                .context("Invalid --filter pattern")?;
            let scenes: Vec<&Scene> = parsed
                .scenes
                .iter()
                .filter(|s| re.as_ref().map_or(true, |re| re.is_match(&s.heading)))
                .collect();
            if scenes.is_empty() {
                println!("No scenes found.");
            } else {
                print_scenes(&scenes);
            }
            Ok(())
        }
        Commands::Characters { id } => {
            let conn = open_library(&settings)?;
            let parsed = load_cached(&conn, id)?;
            if parsed.characters.is_empty() {
                println!("No characters found.");
            } else {
                print_characters(&parsed.characters);
            }
            Ok(())
        }
        Commands::Bookmark { action } => {
            let conn = open_library(&settings)?;
            match action {
                BookmarkAction::Add { id, page, label } => {
                    let page_index = to_page_index(page)?;
                    let bid = db::add_bookmark(&conn, id, page_index, label.as_deref())?;
                    println!("Bookmark #{} on page {}.", bid, page);
                    Ok(())
                }
                BookmarkAction::List { id } => {
                    let marks = db::fetch_bookmarks(&conn, id)?;
                    if marks.is_empty() {
                        println!("No bookmarks.");
                    }
                    for b in &marks {
                        println!(
                            "{:>4} | p.{:<4} | {:<30} | {}",
                            b.id,
                            b.page_index + 1,
                            truncate(b.label.as_deref().unwrap_or("-"), 30),
                            b.created_at
                        );
                    }
                    Ok(())
                }
            }
        }
        Commands::Note { action } => {
            let conn = open_library(&settings)?;
            match action {
                NoteAction::Add { id, page, text, highlight, rect } => {
                    let page_index = to_page_index(page)?;
                    let kind = if highlight {
                        db::NoteKind::Highlight
                    } else {
                        db::NoteKind::Freeform
                    };
                    let nid = db::add_note(&conn, id, page_index, &text, kind, rect.as_deref())?;
                    println!("Note #{} on page {}.", nid, page);
                    Ok(())
                }
                NoteAction::List { id } => {
                    let notes = db::fetch_notes(&conn, id)?;
                    if notes.is_empty() {
                        println!("No notes.");
                    }
                    for n in &notes {
                        println!(
                            "{:>4} | p.{:<4} | {:<9} | {} ({})",
                            n.id,
                            n.page_index + 1,
                            n.kind.as_str(),
                            truncate(&n.text, 60),
                            n.updated_at
                        );
                        if let Some(rect) = &n.rect {
                            println!("     | rect {}", rect);
                        }
                    }
                    Ok(())
                }
            }
        }
        Commands::Library => {
            let conn = open_library(&settings)?;
            let docs = db::fetch_documents(&conn)?;
            if docs.is_empty() {
                println!("Library is empty. Run 'import' first.");
                return Ok(());
            }
            println!(
                "{:>4} | {:<28} | {:>5} | {:>5} | {:<7} | {:<10} | {}",
                "#", "Title", "Pages", "Mins", "Indexed", "Last used", "File"
            );
            println!("{}", "-".repeat(100));
            for d in &docs {
                println!(
                    "{:>4} | {:<28} | {:>5} | {:>5} | {:<7} | {:<10} | {}",
                    d.id,
                    truncate(&d.title, 28),
                    d.page_count,
                    d.estimated_minutes,
                    if d.indexed { "yes" } else { "no" },
                    last_used(d),
                    d.original_file_name
                );
            }
            println!("\n{} documents", docs.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = open_library(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Documents:  {}", s.documents);
            println!("Indexed:    {}", s.indexed);
            println!("Pages:      {}", s.pages);
            println!("Scenes:     {}", s.scenes);
            println!("Characters: {}", s.characters);
            println!("Bookmarks:  {}", s.bookmarks);
            println!("Notes:      {}", s.notes);
            Ok(())
        }
    }
}

async fn run_index(settings: &Settings, files: &[PathBuf], json: bool, no_save: bool) -> Result<()> {
    let results = if files.len() == 1 {
        let parsed = ScriptParser::new(settings.max_pages).parse(&files[0]).await;
        vec![(files[0].clone(), parsed)]
    } else {
        index_many(files, settings.max_pages)
    };

    if !no_save {
        let conn = open_library(settings)?;
        cache_results(&conn, &results);
    }

    let mut failed = 0;
    for (file, parsed) in &results {
        let parsed = match parsed {
            Ok(p) => p,
            Err(e) => {
                failed += 1;
                warn!("Parse failed for {}: {:#}", file.display(), e);
                continue;
            }
        };

        if parsed.is_empty() {
            info!(file = %file.display(), "no scene headings or character cues found");
        }

        if json {
            let out = serde_json::json!({
                "file": file.display().to_string(),
                "scenes": parsed.scenes,
                "characters": parsed.characters,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            println!("== {}", file.display());
            print_result(parsed);
        }
    }

    if failed == results.len() {
        bail!("No document could be indexed");
    }
    Ok(())
}

fn open_library(settings: &Settings) -> Result<rusqlite::Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// Register a file under its canonical path, refreshing its page count.
fn import_one(conn: &rusqlite::Connection, file: &Path) -> Result<i64> {
    let path = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
    let pages = extract::page_count(&path)?;
    db::insert_document(conn, &path, pages)
}

/// Cache every successful parse. A failing document is logged and skipped;
/// returns how many were cached.
fn cache_results(conn: &rusqlite::Connection, results: &[(PathBuf, Result<ParseResult>)]) -> usize {
    let mut cached = 0;
    for (file, parsed) in results {
        let Ok(parsed) = parsed else { continue };
        let saved = import_one(conn, file).and_then(|id| {
            db::save_parse_result(conn, id, parsed)?;
            db::touch_document(conn, id)
        });
        match saved {
            Ok(()) => cached += 1,
            Err(e) => warn!("Could not cache index for {}: {:#}", file.display(), e),
        }
    }
    cached
}

/// Index several documents in parallel; each document is still parsed sequentially.
fn index_many(files: &[PathBuf], max_pages: usize) -> Vec<(PathBuf, Result<ParseResult>)> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let results = files
        .par_iter()
        .map(|file| {
            let parsed = parser::parse_file(file, max_pages);
            pb.inc(1);
            (file.clone(), parsed)
        })
        .collect();

    pb.finish_and_clear();
    results
}

fn load_cached(conn: &rusqlite::Connection, id: i64) -> Result<ParseResult> {
    let Some(doc) = db::fetch_document(conn, id)? else {
        bail!("No document with id {}", id);
    };
    let Some(parsed) = db::load_parse_result(conn, id)? else {
        bail!(
            "{} has not been indexed yet. Run 'index {}' first.",
            doc.title,
            doc.file_path
        );
    };
    db::touch_document(conn, id)?;
    Ok(parsed)
}

/// Date part of the last open, falling back to the import date.
fn last_used(doc: &db::DocumentRow) -> &str {
    let ts = doc.last_opened_at.as_deref().unwrap_or(&doc.created_at);
    ts.get(..10).unwrap_or(ts)
}

fn to_page_index(page: usize) -> Result<usize> {
    match page.checked_sub(1) {
        Some(idx) => Ok(idx),
        None => bail!("Pages are numbered from 1"),
    }
}

fn print_result(parsed: &ParseResult) {
    if parsed.scenes.is_empty() {
        println!("No scenes found.");
    } else {
        let scenes: Vec<&Scene> = parsed.scenes.iter().collect();
        print_scenes(&scenes);
    }
    println!();
    if parsed.characters.is_empty() {
        println!("No characters found.");
    } else {
        print_characters(&parsed.characters);
    }
}

fn print_characters(characters: &[Character]) {
    println!("{:<30} | {:>10}", "Character", "First page");
    println!("{}", "-".repeat(43));
    for c in characters {
        let first = c
            .first_page
            .map(|p| (p + 1).to_string())
            .unwrap_or_else(|| "-".into());
        println!("{:<30} | {:>10}", c.name, first);
    }
}

fn print_scenes(scenes: &[&Scene]) {
    println!("{:>4} | {:<48} | {:<9}", "#", "Heading", "Pages");
    println!("{}", "-".repeat(68));
    for s in scenes {
        println!(
            "{:>4} | {:<48} | {:<9}",
            s.index,
            truncate(&s.heading, 48),
            page_span(s)
        );
    }
}

/// 1-based page span; an open end is shown as "N-".
fn page_span(scene: &Scene) -> String {
    let start = scene.start_page + 1;
    match scene.end_page {
        Some(end) if end == scene.start_page => start.to_string(),
        Some(end) => format!("{}-{}", start, end + 1),
        None => format!("{}-", start),
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(start: usize, end: Option<usize>) -> Scene {
        Scene {
            index: 1,
            heading: "INT. ROOM".into(),
            start_page: start,
            end_page: end,
        }
    }

    #[test]
    fn page_spans_are_one_based() {
        assert_eq!(page_span(&scene(0, Some(0))), "1");
        assert_eq!(page_span(&scene(0, Some(4))), "1-5");
        assert_eq!(page_span(&scene(9, None)), "10-");
    }

    #[test]
    fn page_numbers_start_at_one() {
        assert_eq!(to_page_index(1).unwrap(), 0);
        assert!(to_page_index(0).is_err());
    }

    #[test]
    fn truncate_long_headings() {
        assert_eq!(truncate("INT. ROOM", 20), "INT. ROOM");
        assert_eq!(truncate("INT. VERY LONG PLACE", 4), "INT....");
    }

    #[test]
    fn index_many_reports_each_file() {
        let files = vec![
            PathBuf::from("tests/fixtures/short_film.txt"),
            PathBuf::from("tests/fixtures/missing.txt"),
            PathBuf::from("tests/fixtures/prose.txt"),
        ];
        let results = index_many(&files, 400);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, files[0]);
        assert_eq!(results[0].1.as_ref().unwrap().scenes.len(), 4);
        assert!(results[1].1.is_err());
        assert!(results[2].1.as_ref().unwrap().is_empty());
    }

    fn library_in(dir: &Path) -> Settings {
        Settings {
            db_path: dir.join("library/scenes.sqlite"),
            max_pages: 400,
        }
    }

    #[tokio::test]
    async fn no_save_leaves_library_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let settings = library_in(dir.path());
        let files = vec![PathBuf::from("tests/fixtures/short_film.txt")];
        run_index(&settings, &files, true, true).await.unwrap();
        assert!(!dir.path().join("library").exists());

        run_index(&settings, &files, true, false).await.unwrap();
        assert!(settings.db_path.exists());
    }

    #[test]
    fn cache_skips_failures_and_keeps_going() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let good = PathBuf::from("tests/fixtures/short_film.txt");
        let parsed = parser::parse_file(&good, 400).unwrap();
        let results = vec![
            // Parsed earlier, but gone by the time it is registered.
            (PathBuf::from("tests/fixtures/vanished.txt"), Ok(parsed.clone())),
            (PathBuf::from("tests/fixtures/missing.txt"), Err(anyhow::anyhow!("unreadable"))),
            (good.clone(), Ok(parsed.clone())),
        ];
        assert_eq!(cache_results(&conn, &results), 1);

        let docs = db::fetch_documents(&conn).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(db::load_parse_result(&conn, docs[0].id).unwrap(), Some(parsed));
    }

    #[test]
    fn reimport_refreshes_page_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.txt");
        std::fs::write(&path, "INT. A\x0cEXT. B\x0c").unwrap();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let id = import_one(&conn, &path).unwrap();
        assert_eq!(db::fetch_document(&conn, id).unwrap().unwrap().page_count, 2);

        std::fs::write(&path, "INT. A\x0cEXT. B\x0cINT. C\x0cEXT. D").unwrap();
        assert_eq!(import_one(&conn, &path).unwrap(), id);
        let doc = db::fetch_document(&conn, id).unwrap().unwrap();
        assert_eq!(doc.page_count, 4);
        assert!(db::add_bookmark(&conn, id, 3, None).is_ok());
    }

    #[test]
    fn import_uses_canonical_path() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let a = import_one(&conn, Path::new("tests/fixtures/short_film.txt")).unwrap();
        let b = import_one(&conn, Path::new("tests/../tests/fixtures/short_film.txt")).unwrap();
        assert_eq!(a, b);
        let doc = db::fetch_document(&conn, a).unwrap().unwrap();
        assert_eq!(doc.page_count, 3);
        assert_eq!(doc.title, "short_film");
    }
}
