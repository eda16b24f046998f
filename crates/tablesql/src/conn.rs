//! The public database handle wrapping the underlying SQLite connection.
//!
//! [`FileDb`] delegates queries to [`rusqlite::Connection`] via `Deref` and
//! intercepts the two persistence lifecycle points: [`close`](FileDb::close)
//! runs an `OnClose` auto-save before releasing the connection, and the
//! [`FileTx`] guard returned by [`transaction`](FileDb::transaction) runs an
//! `OnCommit` auto-save after the underlying commit has succeeded. A
//! persistence failure after commit is surfaced to the caller but cannot
//! roll back the in-memory commit.
//!
//! The handle is single-owner: it is not safe for concurrent use across
//! threads, and auto-save always runs synchronously on the caller's thread.

use std::ops::Deref;
use std::path::PathBuf;

use log::debug;
use rusqlite::Connection;

use crate::cancel::CancellationToken;
use crate::dump::{self, DumpOptions};
use crate::err::TableSqlError;

/// When a configured auto-save runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AutoSaveTiming {
    /// Persist once, when the handle is closed.
    OnClose,
    /// Persist after every successful transaction commit.
    OnCommit,
}

/// Sealed auto-save settings carried from the builder into the handle.
#[derive(Debug, Clone)]
pub(crate) struct AutoSave {
    pub(crate) timing: AutoSaveTiming,
    /// Output directory; empty selects overwrite-originals mode.
    pub(crate) dir: PathBuf,
    pub(crate) options: DumpOptions,
}

/// An open in-memory database populated from the load plan's sources.
///
/// Derefs to [`rusqlite::Connection`] for queries and prepared statements.
/// Use [`transaction`](Self::transaction) rather than raw `BEGIN`/`COMMIT`
/// so that commit-time auto-save fires. Dropping the handle releases the
/// database without persisting; call [`close`](Self::close) to trigger an
/// `OnClose` auto-save.
#[derive(Debug)]
pub struct FileDb {
    conn: Option<Connection>,
    auto_save: Option<AutoSave>,
    /// Original absolute paths per table, in load order, for
    /// overwrite-originals auto-save.
    originals: Vec<(String, PathBuf)>,
    cancel: CancellationToken,
}

impl FileDb {
    pub(crate) fn new(
        conn: Connection,
        auto_save: Option<AutoSave>,
        originals: Vec<(String, PathBuf)>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conn: Some(conn),
            auto_save,
            originals,
            cancel,
        }
    }

    /// The underlying SQLite connection.
    pub fn connection(&self) -> &Connection {
        // Invariant: `conn` is only taken inside `close`, which consumes
        // the handle.
        self.conn.as_ref().expect("connection already released")
    }

    /// Begins a transaction whose [`commit`](FileTx::commit) triggers an
    /// `OnCommit` auto-save. The guard rolls back on drop if neither
    /// committed nor rolled back.
    pub fn transaction(&self) -> Result<FileTx<'_>, TableSqlError> {
        self.connection().execute_batch("BEGIN")?;
        Ok(FileTx {
            db: self,
            done: false,
        })
    }

    /// Exports every table to `dir` per `options`, independent of any
    /// configured auto-save.
    pub fn dump_to<P: AsRef<std::path::Path>>(
        &self,
        dir: P,
        options: &DumpOptions,
    ) -> Result<(), TableSqlError> {
        dump::dump(self.connection(), dir.as_ref(), options, &self.cancel)
    }

    /// Closes the handle, running an `OnClose` auto-save first.
    ///
    /// The underlying connection is released even when auto-save fails; in
    /// that case the auto-save error is returned (joined with the close
    /// error if that failed too).
    pub fn close(mut self) -> Result<(), TableSqlError> {
        let save_result = match &self.auto_save {
            Some(auto_save) if auto_save.timing == AutoSaveTiming::OnClose => {
                self.auto_save_now()
            }
            _ => Ok(()),
        };

        let close_result = match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| TableSqlError::from(e)),
            None => Ok(()),
        };

        match (save_result, close_result) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(save), Ok(())) => Err(save),
            (Ok(()), Err(close)) => Err(close),
            (Err(save), Err(close)) => Err(TableSqlError::Other(format!(
                "auto-save failed: {save}; close failed: {close}"
            ))),
        }
    }

    /// Runs the configured auto-save immediately.
    fn auto_save_now(&self) -> Result<(), TableSqlError> {
        let Some(auto_save) = &self.auto_save else {
            return Ok(());
        };
        if auto_save.dir.as_os_str().is_empty() {
            debug!("auto-saving tables over their original files");
            dump::dump_overwrite(
                self.connection(),
                &self.originals,
                &auto_save.options,
                &self.cancel,
            )
        } else {
            debug!("auto-saving tables to {}", auto_save.dir.display());
            dump::dump(
                self.connection(),
                &auto_save.dir,
                &auto_save.options,
                &self.cancel,
            )
        }
    }
}

impl Deref for FileDb {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection()
    }
}

/// A transaction guard over a [`FileDb`].
///
/// Derefs to the connection for statements inside the transaction.
pub struct FileTx<'db> {
    db: &'db FileDb,
    done: bool,
}

impl FileTx<'_> {
    /// Commits the transaction, then runs an `OnCommit` auto-save.
    ///
    /// An auto-save failure is returned here but the in-memory commit has
    /// already happened and is not rolled back.
    pub fn commit(mut self) -> Result<(), TableSqlError> {
        self.db.connection().execute_batch("COMMIT")?;
        self.done = true;

        match &self.db.auto_save {
            Some(auto_save) if auto_save.timing == AutoSaveTiming::OnCommit => {
                self.db.auto_save_now()
            }
            _ => Ok(()),
        }
    }

    /// Rolls the transaction back.
    pub fn rollback(mut self) -> Result<(), TableSqlError> {
        self.db.connection().execute_batch("ROLLBACK")?;
        self.done = true;
        Ok(())
    }
}

impl Deref for FileTx<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.db.connection()
    }
}

impl Drop for FileTx<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.db.connection().execute_batch("ROLLBACK");
        }
    }
}
