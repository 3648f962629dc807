//! SQLite backend schema: DDL, connection pragmas, and prepared statements
//! (spec.md §4.4).
//!
//! Table/column layout and pragma set are taken verbatim from
//! `original_source/tsk/hashdb/sqlite_hdb.cpp`'s `sqlite_hdb_create_tables`
//! and `sqlite_hdb_attempt_exec` pragma calls. Bound parameters are used
//! everywhere instead of string interpolation — the idiomatic, strictly
//! stronger answer to the source's "embedded single quotes are escaped"
//! invariant (spec.md §3).

use rusqlite::Connection;

use crate::error::{HdbError, HdbResult};

pub const CREATE_DB_PROPERTIES: &str =
    "CREATE TABLE db_properties (name TEXT NOT NULL, value TEXT);";
pub const CREATE_HASHES: &str = "CREATE TABLE hashes (id INTEGER PRIMARY KEY AUTOINCREMENT, md5 BINARY(16) UNIQUE, sha1 BINARY(20), sha2_256 BINARY(32));";
pub const CREATE_FILE_NAMES: &str = "CREATE TABLE file_names (name TEXT NOT NULL, hash_id INTEGER NOT NULL, PRIMARY KEY(name, hash_id));";
pub const CREATE_COMMENTS: &str = "CREATE TABLE comments (comment TEXT NOT NULL, hash_id INTEGER NOT NULL, PRIMARY KEY(comment, hash_id));";
pub const CREATE_MD5_INDEX: &str = "CREATE INDEX md5_index ON hashes(md5);";

pub const SCHEMA_VERSION: &str = "1";

pub const INSERT_MD5_INTO_HASHES: &str = "INSERT OR IGNORE INTO hashes (md5) VALUES (?1)";
pub const INSERT_INTO_FILE_NAMES: &str =
    "INSERT OR IGNORE INTO file_names (name, hash_id) VALUES (?1, ?2)";
pub const INSERT_INTO_COMMENTS: &str =
    "INSERT OR IGNORE INTO comments (comment, hash_id) VALUES (?1, ?2)";
pub const SELECT_FROM_HASHES_BY_MD5: &str = "SELECT id, md5 from hashes where md5 = ?1 limit 1";
pub const SELECT_FROM_FILE_NAMES: &str = "SELECT name from file_names where hash_id = ?1";
pub const SELECT_FROM_COMMENTS: &str = "SELECT comment from comments where hash_id = ?1";

/// Create the four tables and the `md5_index` secondary index, then record
/// the schema version in `db_properties`. Called once by `SqliteDb::create`.
pub fn create_schema(conn: &Connection) -> HdbResult<()> {
    conn.execute_batch(CREATE_DB_PROPERTIES)?;
    conn.execute_batch(CREATE_HASHES)?;
    conn.execute_batch(CREATE_FILE_NAMES)?;
    conn.execute_batch(CREATE_COMMENTS)?;
    conn.execute_batch(CREATE_MD5_INDEX)?;
    conn.execute(
        "INSERT INTO db_properties (name, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

/// Apply the connection-level pragmas spec.md §4.4 calls for: durability is
/// traded for throughput because a hash-set database is fully rebuildable
/// from its source material.
pub fn apply_pragmas(conn: &Connection) -> HdbResult<()> {
    conn.execute_batch("PRAGMA synchronous = OFF;")?;
    conn.pragma_update(None, "encoding", "UTF-8")?;
    conn.pragma_update(None, "read_uncommitted", true)?;
    conn.pragma_update(None, "page_size", 4096)?;
    apply_chunk_size_hint(conn);
    Ok(())
}

/// `SQLITE_FCNTL_CHUNK_SIZE = 1 MiB` (spec.md §4.4). No pragma maps to this
/// file-control opcode, so it goes through the raw `sqlite3_file_control`
/// FFI call. Advisory only: if the underlying VFS rejects the hint the
/// database still works, just without the preallocation benefit, so
/// failures here are silently ignored rather than surfaced as errors.
fn apply_chunk_size_hint(conn: &Connection) {
    const SQLITE_FCNTL_CHUNK_SIZE: i32 = 6;
    const CHUNK_SIZE: i32 = 1024 * 1024;
    let mut chunk_size = CHUNK_SIZE;
    // SAFETY: `conn.handle()` is a valid, open sqlite3* for the lifetime of
    // this call; `chunk_size` is a valid `int*` the FFI call only reads.
    // The file-control opcode is advisory and its return code is ignored.
    unsafe {
        let raw = conn.handle();
        rusqlite::ffi::sqlite3_file_control(
            raw,
            std::ptr::null(),
            SQLITE_FCNTL_CHUNK_SIZE,
            &mut chunk_size as *mut i32 as *mut std::ffi::c_void,
        );
    }
}

/// Verify a freshly-opened file actually has the schema this module
/// creates (the four tables), so `open` can tell a stray non-hashdb SQLite
/// file apart from a real one.
pub fn verify_schema(conn: &Connection) -> HdbResult<()> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name IN ('db_properties', 'hashes', 'file_names', 'comments')",
        [],
        |row| row.get(0),
    )?;
    if count != 4 {
        return Err(HdbError::Corrupt(
            "sqlite file does not carry the hashdb schema".into(),
        ));
    }
    Ok(())
}

/// The six prepared statements spec.md §4.4 calls for are cached, not
/// stored as struct fields: a `Statement<'conn>` borrowing the very
/// `Connection` it would sit alongside on `SqliteDb` is self-referential,
/// which safe Rust has no good way to express. `rusqlite`'s own prepared
/// statement cache (`Connection::prepare_cached`) gives the same effect —
/// each of the six SQL strings above is parsed once and reused for the
/// life of the connection, finalized when the connection (and its cache)
/// is dropped in `close` — without the lifetime problem. This is the
/// visibly-intended design from Open Question 3 (Design Notes §9),
/// expressed the way the crate's actual dependency supports it.
pub fn prepare_cache_capacity(conn: &Connection) {
    conn.set_prepared_statement_cache_capacity(8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_schema_then_verify_round_trips() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        verify_schema(&conn).unwrap();
    }

    #[test]
    fn verify_schema_rejects_bare_sqlite_file() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE unrelated (x INTEGER);")
            .unwrap();
        let err = verify_schema(&conn).unwrap_err();
        assert!(matches!(err, HdbError::Corrupt(_)));
    }

    #[test]
    fn cached_statements_prepare_against_schema() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        prepare_cache_capacity(&conn);
        conn.prepare_cached(INSERT_MD5_INTO_HASHES).unwrap();
        conn.prepare_cached(SELECT_FROM_HASHES_BY_MD5).unwrap();
    }
}
