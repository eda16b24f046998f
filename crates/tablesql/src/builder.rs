//! Source collection and load planning.
//!
//! [`DatabaseBuilder`] is the mutable configuration surface: file and
//! directory paths, raw byte streams with declared names and kinds,
//! read-only file trees, the chunk budget, and auto-save settings.
//! [`build`](DatabaseBuilder::build) validates and resolves everything into
//! a sealed [`LoadPlan`]; only a plan can be [`open`](LoadPlan::open)ed,
//! which creates a fresh in-memory database, loads every source in plan
//! order, and returns the wrapped connection.
//!
//! Deduplication follows the uncompressed-wins rule: when a compressed and
//! an uncompressed source resolve to the same table name, the compressed
//! one is dropped; any other clash is a [`TableSqlError::DuplicateTable`].

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use log::debug;
use path_abs::{PathAbs, PathInfo};
use rusqlite::Connection;

use crate::cancel::CancellationToken;
use crate::chunk::ChunkBudget;
use crate::conn::{AutoSave, AutoSaveTiming, FileDb};
use crate::dump::DumpOptions;
use crate::err::TableSqlError;
use crate::file_kind::{Compression, FileKind, table_name_from_path};
use crate::loader;

/// A read-only tree of files, such as an embedded asset bundle or a live
/// directory.
///
/// Implementations list entries as relative paths and open them on demand;
/// the library owns the opened readers and drops them at teardown. The
/// blanket [`PathBuf`] implementation walks a directory on disk.
pub trait FileTree {
    /// All file paths in the tree, relative to its root.
    fn list(&self) -> std::io::Result<Vec<PathBuf>>;

    /// Opens one listed file for reading.
    fn open(&self, path: &Path) -> std::io::Result<Box<dyn Read>>;
}

impl FileTree for PathBuf {
    fn list(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        walk_files(self, &mut files)?;
        files.sort();
        Ok(files
            .into_iter()
            .filter_map(|p| p.strip_prefix(self).ok().map(Path::to_path_buf))
            .collect())
    }

    fn open(&self, path: &Path) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(fs::File::open(self.join(path))?))
    }
}

/// Recursive depth-first walk, entries sorted by name for a stable order.
fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

enum SourceInput {
    Path(PathBuf),
    Reader {
        reader: Box<dyn Read>,
        table: String,
        kind: FileKind,
    },
    Tree(Box<dyn FileTree>),
}

/// A resolved file source: absolute path, kind, derived table name.
#[derive(Debug)]
pub(crate) struct FileEntry {
    pub(crate) path: PathBuf,
    pub(crate) kind: FileKind,
    pub(crate) table: String,
}

/// A resolved stream source. Tree entries become stream entries at build.
pub(crate) struct StreamEntry {
    pub(crate) reader: Box<dyn Read>,
    pub(crate) kind: FileKind,
    pub(crate) table: String,
    pub(crate) input: String,
}

impl std::fmt::Debug for StreamEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEntry")
            .field("reader", &"Box<dyn Read>")
            .field("kind", &self.kind)
            .field("table", &self.table)
            .field("input", &self.input)
            .finish()
    }
}

#[derive(Debug)]
pub(crate) enum PlanEntry {
    File(FileEntry),
    Stream(StreamEntry),
}

impl PlanEntry {
    fn table(&self) -> &str {
        match self {
            PlanEntry::File(f) => &f.table,
            PlanEntry::Stream(s) => &s.table,
        }
    }

    fn compression(&self) -> Compression {
        let kind = match self {
            PlanEntry::File(f) => f.kind,
            PlanEntry::Stream(s) => s.kind,
        };
        kind.compression().unwrap_or_default()
    }
}

/// Staged configuration for a tablesql database.
///
/// Accumulates sources and settings, then seals them into a [`LoadPlan`]
/// via [`build`](Self::build). Not safe for concurrent configuration.
#[derive(Default)]
pub struct DatabaseBuilder {
    inputs: Vec<SourceInput>,
    budget: ChunkBudget,
    auto_save: Option<AutoSave>,
    cancel: CancellationToken,
}

impl DatabaseBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues one file or directory path.
    ///
    /// Files are classified by compound extension; directories are walked
    /// depth-first and every supported file is appended. Validation
    /// happens at [`build`](Self::build).
    pub fn add_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.inputs
            .push(SourceInput::Path(path.as_ref().to_path_buf()));
        self
    }

    /// Enqueues several paths, in order.
    pub fn add_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self = self.add_path(path);
        }
        self
    }

    /// Enqueues a raw byte stream with an explicit table name and kind.
    ///
    /// The stream is consumed exactly once at load time and never retained
    /// after [`LoadPlan::open`] returns. A compressed kind means the bytes
    /// are still compressed and will be decoded; [`Compression::None`]
    /// means they are already plain.
    pub fn add_reader<R: Read + 'static>(
        mut self,
        reader: R,
        table_name: &str,
        kind: FileKind,
    ) -> Self {
        self.inputs.push(SourceInput::Reader {
            reader: Box::new(reader),
            table: table_name.to_string(),
            kind,
        });
        self
    }

    /// Enqueues a read-only file tree; every supported file in it is
    /// discovered by suffix scan, recursively.
    pub fn add_file_tree<T: FileTree + 'static>(mut self, tree: T) -> Self {
        self.inputs.push(SourceInput::Tree(Box::new(tree)));
        self
    }

    /// Sets the maximum rows buffered per chunk. Non-positive values are
    /// ignored; the 10 MiB byte bound always applies as well.
    pub fn set_chunk_budget(mut self, rows: usize) -> Self {
        if rows > 0 {
            self.budget.max_rows = rows;
        }
        self
    }

    /// Persists all tables when the handle is closed.
    ///
    /// An empty `dir` selects overwrite-originals mode, valid only when
    /// every source is a file path.
    pub fn auto_save_on_close<P: AsRef<Path>>(mut self, dir: P, options: DumpOptions) -> Self {
        self.auto_save = Some(AutoSave {
            timing: AutoSaveTiming::OnClose,
            dir: dir.as_ref().to_path_buf(),
            options,
        });
        self
    }

    /// Persists all tables after every successful transaction commit.
    ///
    /// An empty `dir` selects overwrite-originals mode, valid only when
    /// every source is a file path.
    pub fn auto_save_on_commit<P: AsRef<Path>>(mut self, dir: P, options: DumpOptions) -> Self {
        self.auto_save = Some(AutoSave {
            timing: AutoSaveTiming::OnCommit,
            dir: dir.as_ref().to_path_buf(),
            options,
        });
        self
    }

    /// Removes any configured auto-save.
    pub fn disable_auto_save(mut self) -> Self {
        self.auto_save = None;
        self
    }

    /// Installs a cancellation token checked throughout loading and
    /// persistence.
    pub fn set_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Validates and resolves every input into a sealed [`LoadPlan`].
    ///
    /// Load order is: paths in declaration order (directory entries in
    /// walk order), then streams in declaration order, then tree entries
    /// in discovery order.
    pub fn build(self) -> Result<LoadPlan, TableSqlError> {
        if self.inputs.is_empty() {
            return Err(TableSqlError::Other(
                "no input sources provided".to_string(),
            ));
        }

        let mut files: Vec<FileEntry> = Vec::new();
        let mut streams: Vec<StreamEntry> = Vec::new();
        let mut tree_streams: Vec<StreamEntry> = Vec::new();
        let mut has_non_path_source = false;

        for input in self.inputs {
            match input {
                SourceInput::Path(path) => resolve_path(path, &mut files)?,
                SourceInput::Reader {
                    reader,
                    table,
                    kind,
                } => {
                    has_non_path_source = true;
                    streams.push(resolve_stream(reader, table, kind)?);
                }
                SourceInput::Tree(tree) => {
                    has_non_path_source = true;
                    resolve_tree(tree.as_ref(), &mut tree_streams)?;
                }
            }
        }

        let mut entries: Vec<PlanEntry> = files.into_iter().map(PlanEntry::File).collect();
        entries.extend(streams.into_iter().map(PlanEntry::Stream));
        entries.extend(tree_streams.into_iter().map(PlanEntry::Stream));
        let entries = dedup_entries(entries)?;

        if let Some(auto_save) = &self.auto_save {
            if auto_save.dir.as_os_str().is_empty() && has_non_path_source {
                return Err(TableSqlError::AutoSaveMisconfigured(
                    "overwrite-originals auto-save requires every source to be a file path"
                        .to_string(),
                ));
            }
        }

        Ok(LoadPlan {
            entries,
            budget: self.budget,
            auto_save: self.auto_save,
            cancel: self.cancel,
        })
    }
}

fn resolve_path(path: PathBuf, files: &mut Vec<FileEntry>) -> Result<(), TableSqlError> {
    let abs = PathAbs::new(&path)?.as_path().to_path_buf();
    if !abs.exists() {
        return Err(TableSqlError::InputNotFound { path });
    }

    if abs.is_dir() {
        let mut found = Vec::new();
        walk_files(&abs, &mut found)?;
        found.sort();
        for file in found {
            let kind = FileKind::from_path(&file);
            if kind.is_supported() {
                files.push(FileEntry {
                    table: table_name_from_path(&file),
                    path: file,
                    kind,
                });
            } else {
                debug!("skipping unsupported file {}", file.display());
            }
        }
        return Ok(());
    }

    let kind = FileKind::from_path(&abs);
    if !kind.is_supported() {
        return Err(TableSqlError::UnsupportedFormat { path: abs });
    }
    files.push(FileEntry {
        table: table_name_from_path(&abs),
        path: abs,
        kind,
    });
    Ok(())
}

fn resolve_stream(
    reader: Box<dyn Read>,
    table: String,
    kind: FileKind,
) -> Result<StreamEntry, TableSqlError> {
    if table.is_empty() {
        return Err(TableSqlError::Other(
            "stream sources require a non-empty table name".to_string(),
        ));
    }
    if !kind.is_supported() {
        return Err(TableSqlError::UnsupportedFormat {
            path: PathBuf::from(&table),
        });
    }

    // Peek one byte so an empty stream fails at build rather than during
    // loading.
    let mut buffered = BufReader::new(reader);
    if buffered.fill_buf()?.is_empty() {
        return Err(TableSqlError::EmptyInput {
            input: table.clone(),
        });
    }

    let input = format!("stream:{table}");
    Ok(StreamEntry {
        reader: Box::new(buffered),
        kind,
        table,
        input,
    })
}

fn resolve_tree(
    tree: &dyn FileTree,
    out: &mut Vec<StreamEntry>,
) -> Result<(), TableSqlError> {
    let mut paths = tree.list()?;
    paths.sort();
    for path in paths {
        let kind = FileKind::from_path(&path);
        if !kind.is_supported() {
            debug!("skipping unsupported tree entry {}", path.display());
            continue;
        }
        let reader = tree.open(&path)?;
        let table = table_name_from_path(&path);
        let mut entry = resolve_stream(reader, table, kind)?;
        entry.input = path.display().to_string();
        out.push(entry);
    }
    Ok(())
}

/// Applies the uncompressed-wins rule, erroring on any other clash.
fn dedup_entries(entries: Vec<PlanEntry>) -> Result<Vec<PlanEntry>, TableSqlError> {
    let mut result: Vec<PlanEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        let table = entry.table().to_string();
        match result.iter().position(|e| e.table() == table) {
            None => result.push(entry),
            Some(pos) => {
                let existing = result[pos].compression();
                let incoming = entry.compression();
                if existing == Compression::None && incoming != Compression::None {
                    debug!("dropping compressed duplicate of table {table:?}");
                } else if existing != Compression::None && incoming == Compression::None {
                    debug!("replacing compressed entry for table {table:?} with uncompressed");
                    result[pos] = entry;
                } else {
                    return Err(TableSqlError::DuplicateTable { table });
                }
            }
        }
    }
    Ok(result)
}

/// The immutable, validated set of sources produced by
/// [`DatabaseBuilder::build`].
///
/// Table names in a plan are pairwise distinct. The plan exclusively owns
/// its resolved readers; opening consumes them.
#[derive(Debug)]
pub struct LoadPlan {
    entries: Vec<PlanEntry>,
    budget: ChunkBudget,
    auto_save: Option<AutoSave>,
    cancel: CancellationToken,
}

impl LoadPlan {
    /// Table names in load order.
    pub fn table_names(&self) -> Vec<&str> {
        self.entries.iter().map(PlanEntry::table).collect()
    }

    /// Creates a fresh in-memory database, loads every source in plan
    /// order, and returns the wrapped connection.
    ///
    /// A failed open holds no resources: the in-memory database is
    /// dropped, and every reader opened so far has been consumed or
    /// released.
    pub fn open(self) -> Result<FileDb, TableSqlError> {
        let mut conn = Connection::open_in_memory()?;
        let mut originals: Vec<(String, PathBuf)> = Vec::new();

        for entry in self.entries {
            self.cancel.check()?;
            match entry {
                PlanEntry::File(file) => {
                    let tables = loader::load_path(
                        &mut conn,
                        &file.path,
                        file.kind,
                        &file.table,
                        self.budget,
                        &self.cancel,
                    )
                    .map_err(|e| e.with_input(&file.path.display().to_string()))?;
                    // A workbook expands into several tables; each one maps
                    // back to the same original file.
                    for table in tables {
                        originals.push((table, file.path.clone()));
                    }
                }
                PlanEntry::Stream(stream) => {
                    loader::load_reader(
                        &mut conn,
                        stream.reader,
                        stream.kind,
                        &stream.table,
                        &stream.input,
                        self.budget,
                        &self.cancel,
                    )
                    .map_err(|e| e.with_input(&stream.input))?;
                }
            }
        }

        Ok(FileDb::new(conn, self.auto_save, originals, self.cancel))
    }
}
