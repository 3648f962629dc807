//! `SqliteDb` — the mutable, user-maintained hash-set variant (spec.md
//! §4.4). The only backend that supports `create`, `add_entry`, and
//! transactions.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::OptionalExtension;

use crate::common::hex;
use crate::error::{HdbError, HdbResult};
use crate::path::display_name;
use crate::sqlite_schema::{
    apply_pragmas, create_schema, prepare_cache_capacity, verify_schema, INSERT_INTO_COMMENTS,
    INSERT_INTO_FILE_NAMES, INSERT_MD5_INTO_HASHES, SELECT_FROM_COMMENTS, SELECT_FROM_FILE_NAMES,
    SELECT_FROM_HASHES_BY_MD5,
};

use super::{CallbackControl, HashInfo, LookupCallback, LookupMode, LookupOutcome};

pub struct SqliteDb {
    path: PathBuf,
    display_name: String,
    conn: Mutex<rusqlite::Connection>,
    transaction_in_progress: Mutex<bool>,
}

impl SqliteDb {
    /// Open an existing SQLite-backed hash set. Fails with `Corrupt` if the
    /// file is a SQLite database but does not carry this crate's schema.
    pub fn open(path: &Path) -> HdbResult<Self> {
        let conn = rusqlite::Connection::open(path)?;
        apply_pragmas(&conn)?;
        prepare_cache_capacity(&conn);
        verify_schema(&conn)?;
        Ok(Self::from_connection(path, conn))
    }

    /// Create a fresh, empty, writable SQLite hash set at `path`.
    /// `AlreadyExists` if a file is already there (spec.md §4.1).
    pub fn create(path: &Path) -> HdbResult<Self> {
        if path.exists() {
            return Err(HdbError::CreateFailed(format!(
                "{} already exists",
                path.display()
            )));
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| HdbError::CreateFailed(e.to_string()))?;
        apply_pragmas(&conn)?;
        prepare_cache_capacity(&conn);
        create_schema(&conn)?;
        Ok(Self::from_connection(path, conn))
    }

    fn from_connection(path: &Path, conn: rusqlite::Connection) -> Self {
        Self {
            path: path.to_path_buf(),
            display_name: display_name(&path.to_string_lossy()),
            conn: Mutex::new(conn),
            transaction_in_progress: Mutex::new(false),
        }
    }

    pub fn source_path(&self) -> &PathBuf {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn accepts_updates(&self) -> bool {
        true
    }

    fn hash_to_blob(hash: &str, expected_hex_len: usize, label: &'static str) -> HdbResult<Vec<u8>> {
        if hash.len() != expected_hex_len || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HdbError::InvalidHash(format!("{label}: {hash}")));
        }
        hex::decode(hash.as_bytes()).ok_or_else(|| HdbError::InvalidHash(hash.to_string()))
    }

    /// spec.md §4.4 `add_entry` algorithm: find-or-insert the hash row,
    /// then `INSERT OR IGNORE` each of filename/comment into its
    /// association table. Duplicates are silently dropped by the
    /// composite primary key.
    pub fn add_entry(
        &mut self,
        filename: Option<&str>,
        md5: &str,
        sha1: Option<&str>,
        sha256: Option<&str>,
        comment: Option<&str>,
    ) -> HdbResult<()> {
        let md5_blob = Self::hash_to_blob(md5, 32, "md5")?;
        let sha1_blob = sha1.map(|s| Self::hash_to_blob(s, 40, "sha1")).transpose()?;
        let sha256_blob = sha256
            .map(|s| Self::hash_to_blob(s, 64, "sha256"))
            .transpose()?;

        let conn = self.conn.lock().unwrap();

        let existing: Option<i64> = conn
            .query_row(SELECT_FROM_HASHES_BY_MD5, [&md5_blob], |row| row.get(0))
            .optional()?;

        let hash_id = match existing {
            Some(id) => id,
            None => {
                conn.prepare_cached(INSERT_MD5_INTO_HASHES)?
                    .execute([&md5_blob])?;
                conn.last_insert_rowid()
            }
        };

        if let Some(blob) = &sha1_blob {
            conn.execute(
                "UPDATE hashes SET sha1 = ?1 WHERE id = ?2",
                rusqlite::params![blob, hash_id],
            )?;
        }
        if let Some(blob) = &sha256_blob {
            conn.execute(
                "UPDATE hashes SET sha2_256 = ?1 WHERE id = ?2",
                rusqlite::params![blob, hash_id],
            )?;
        }

        if let Some(name) = filename {
            let cleaned = strip_control_chars(name);
            conn.prepare_cached(INSERT_INTO_FILE_NAMES)?
                .execute(rusqlite::params![cleaned, hash_id])?;
        }
        if let Some(c) = comment {
            let cleaned = strip_control_chars(c);
            conn.prepare_cached(INSERT_INTO_COMMENTS)?
                .execute(rusqlite::params![cleaned, hash_id])?;
        }

        Ok(())
    }

    pub fn lookup(
        &mut self,
        hash: &str,
        mode: LookupMode,
        cb: &mut LookupCallback<'_>,
    ) -> HdbResult<LookupOutcome> {
        let info = self.lookup_verbose(hash)?;
        let Some(info) = info else {
            return Ok(LookupOutcome::NotFound);
        };
        if mode == LookupMode::Full {
            for name in &info.names {
                if cb(hash, name)? == CallbackControl::Stop {
                    break;
                }
            }
        }
        Ok(LookupOutcome::Found)
    }

    pub fn lookup_verbose(&mut self, hash: &str) -> HdbResult<Option<HashInfo>> {
        let blob = Self::hash_to_blob(hash, 32, "md5")?;
        let conn = self.conn.lock().unwrap();

        let row: Option<(i64, Vec<u8>)> = conn
            .query_row(SELECT_FROM_HASHES_BY_MD5, [&blob], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        let Some((id, md5_blob)) = row else {
            return Ok(None);
        };

        let mut names_stmt = conn.prepare_cached(SELECT_FROM_FILE_NAMES)?;
        let names = names_stmt
            .query_map([id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut comments_stmt = conn.prepare_cached(SELECT_FROM_COMMENTS)?;
        let comments = comments_stmt
            .query_map([id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let (sha1_blob, sha256_blob): (Option<Vec<u8>>, Option<Vec<u8>>) = conn.query_row(
            "SELECT sha1, sha2_256 FROM hashes WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(Some(HashInfo {
            id: Some(id),
            md5: Some(hex::encode(&md5_blob).to_ascii_uppercase()),
            sha1: sha1_blob.map(|b| hex::encode(&b).to_ascii_uppercase()),
            sha256: sha256_blob.map(|b| hex::encode(&b).to_ascii_uppercase()),
            names,
            comments,
        }))
    }

    pub fn begin_transaction(&mut self) -> HdbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("BEGIN;")?;
        *self.transaction_in_progress.lock().unwrap() = true;
        Ok(())
    }

    pub fn commit_transaction(&mut self) -> HdbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("COMMIT;")?;
        *self.transaction_in_progress.lock().unwrap() = false;
        Ok(())
    }

    pub fn rollback_transaction(&mut self) -> HdbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("ROLLBACK;")?;
        *self.transaction_in_progress.lock().unwrap() = false;
        Ok(())
    }

    pub fn close(self) -> HdbResult<()> {
        Ok(())
    }
}

/// HashName/HashComment invariant (spec.md §3): control characters < 0x20
/// are stripped. SQL injection is not a concern here since every statement
/// binds parameters rather than interpolating strings (§4.4 [AMBIENT:
/// security]).
fn strip_control_chars(s: &str) -> String {
    s.chars().filter(|c| *c as u32 >= 0x20).collect()
}
