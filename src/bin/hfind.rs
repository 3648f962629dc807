// hfind — thin CLI front-end exercising the hashdb_engine library: build an
// index over a source hash set, look up a hash, or add/inspect entries in a
// mutable SQLite hash set. In the same spirit as this crate's teacher repo's
// per-tool `src/bin/*.rs` binaries: a `clap::Parser` shell around a library
// module, here `hashdb_engine::db`.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use hashdb_engine::db::{CallbackControl, LookupMode};
use hashdb_engine::{open, HashKind, OpenFlags};

#[derive(Parser)]
#[command(name = "hfind", about = "Look up and maintain hash-set databases")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a sorted index over a source hash-set database
    Index {
        /// Path to the source database (NSRL, md5sum, HashKeeper, or EnCase)
        path: PathBuf,
        /// Hash type to index: md5 or sha1
        #[arg(long, default_value = "md5")]
        hash_type: String,
        /// Per-run memory budget for the external merge sort, in bytes (0 = default)
        #[arg(long, default_value_t = 0)]
        memory_budget: usize,
    },
    /// Look up a hash in a database
    Lookup {
        /// Path to the source database, or to an index file if --index-only
        path: PathBuf,
        /// Hash to search for (hex)
        hash: String,
        /// Only check presence; do not resolve associated names
        #[arg(long)]
        quick: bool,
        /// Open in index-only mode (source file need not exist)
        #[arg(long)]
        index_only: bool,
    },
    /// Create a new, empty, writable SQLite hash set
    Create {
        /// Path for the new SQLite database
        path: PathBuf,
    },
    /// Add an entry to a mutable SQLite hash set
    Add {
        /// Path to the SQLite database
        path: PathBuf,
        /// MD5 hex digest (required)
        #[arg(long)]
        md5: String,
        /// SHA-1 hex digest
        #[arg(long)]
        sha1: Option<String>,
        /// SHA-256 hex digest
        #[arg(long)]
        sha256: Option<String>,
        /// Associated filename
        #[arg(long)]
        name: Option<String>,
        /// Free-form comment
        #[arg(long)]
        comment: Option<String>,
    },
}

fn parse_hash_kind(s: &str) -> Result<HashKind, String> {
    match s.to_ascii_lowercase().as_str() {
        "md5" => Ok(HashKind::Md5),
        "sha1" => Ok(HashKind::Sha1),
        other => Err(format!("unsupported hash type for indexing: {other}")),
    }
}

fn run() -> hashdb_engine::HdbResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Index {
            path,
            hash_type,
            memory_budget,
        } => {
            let hash_kind = parse_hash_kind(&hash_type)
                .map_err(hashdb_engine::HdbError::InvalidArgument)?;
            let mut db = open(&path, OpenFlags::default())?;
            let stats = db.make_index(hash_kind, memory_budget)?;
            println!(
                "records_written={} duplicates_skipped={} format_errors={}",
                stats.records_written, stats.duplicates_skipped, stats.format_errors
            );
        }
        Command::Lookup {
            path,
            hash,
            quick,
            index_only,
        } => {
            let flags = OpenFlags {
                index_only,
                best_effort: index_only,
            };
            let mut db = open(&path, flags)?;
            let mode = if quick { LookupMode::Quick } else { LookupMode::Full };
            let mut found_any = false;
            let outcome = db.lookup(&hash, mode, &mut |_, name| {
                found_any = true;
                if name.is_empty() {
                    println!("FOUND");
                } else {
                    println!("FOUND\t{name}");
                }
                Ok(CallbackControl::Continue)
            })?;
            if outcome == hashdb_engine::LookupOutcome::NotFound {
                println!("NOTFOUND");
                process::exit(1);
            }
            if !found_any && mode == LookupMode::Quick {
                println!("FOUND");
            }
        }
        Command::Create { path } => {
            hashdb_engine::db::SqliteDb::create(&path)?;
            println!("created {}", path.display());
        }
        Command::Add {
            path,
            md5,
            sha1,
            sha256,
            name,
            comment,
        } => {
            let mut db = open(&path, OpenFlags::default())?;
            db.add_entry(
                name.as_deref(),
                &md5,
                sha1.as_deref(),
                sha256.as_deref(),
                comment.as_deref(),
            )?;
            println!("added {md5}");
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        tracing::error!("hfind: {e}");
        eprintln!("hfind: {e}");
        process::exit(2);
    }
}
