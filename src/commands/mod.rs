/*!
# Command Layer (C4)

High-level device operations, each composed from one or a few code units
submitted through the REPL engine. Results come back as
`print(repr(...))`, decoded with the restricted literal reader in
[`literal`].
*/

pub mod helpers;
pub mod literal;

use crate::error::{Error, Result};
use crate::repl::ReplEngine;
use crate::transport::Transport;
use literal::Literal;
use std::time::Duration;

/// One entry of a directory listing: a name and, for files, their size.
/// `None` marks a directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub size: Option<u64>,
}

/// A recursive directory tree as returned by `tree`.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub name: String,
    pub total_size: u64,
    pub children: Option<Vec<TreeNode>>,
}

/// The three possible outcomes of `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatResult {
    Absent,
    Directory,
    File(u64),
}

/// The per-path outcome of a batched `fileinfo` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileInfo {
    /// The destination does not exist.
    Absent,
    /// The destination exists but its size does not match.
    SizeMismatch(u64),
    /// The destination exists, the size matches, and here is its hash.
    Match { size: u64, hash: [u8; 32] },
}

/// Progress callback: `(transferred_bytes, total_bytes)`, invoked after each
/// chunk of the current file.
pub type Progress<'a> = dyn FnMut(u64, u64) + 'a;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `code`, requiring a single successful `print(repr(...))` line,
/// returns the decoded literal.
fn run_literal<T: Transport>(engine: &mut ReplEngine<T>, code: &str) -> Result<Literal> {
    let out = engine.exec_raw(code.as_bytes(), DEFAULT_TIMEOUT)?;
    let text = String::from_utf8_lossy(&out.stdout);
    let text = text.trim();
    literal::parse(text).map_err(|e| Error::desync(format!("{e} (raw: {text:?})")))
}

/// `ls(path)`.
pub fn ls<T: Transport>(engine: &mut ReplEngine<T>, path: &str) -> Result<Vec<DirEntry>> {
    let out = engine.exec_raw(helpers::ls(path).as_bytes(), DEFAULT_TIMEOUT);
    let out = match out {
        Err(Error::CmdError { stderr_text, .. }) if stderr_text.contains("ENOENT") => {
            return Err(Error::DirNotFound { path: path.into() })
        }
        other => other?,
    };
    let text = String::from_utf8_lossy(&out.stdout);
    let lit = literal::parse(text.trim()).map_err(|e| Error::desync(e.to_string()))?;
    let seq = lit
        .as_seq()
        .ok_or_else(|| Error::desync("ls: expected a list literal"))?;
    let mut entries = Vec::with_capacity(seq.len());
    for item in seq {
        let pair = item
            .as_seq()
            .ok_or_else(|| Error::desync("ls: expected (name, size) pairs"))?;
        let name = pair
            .first()
            .and_then(Literal::as_str)
            .ok_or_else(|| Error::desync("ls: missing name"))?
            .to_string();
        let size = pair.get(1).and_then(Literal::as_int).map(|i| i as u64);
        entries.push(DirEntry { name, size });
    }
    Ok(entries)
}

/// `stat(path)`.
pub fn stat<T: Transport>(engine: &mut ReplEngine<T>, path: &str) -> Result<StatResult> {
    let lit = run_literal(engine, &helpers::stat(path))?;
    Ok(match lit {
        Literal::None => StatResult::Absent,
        Literal::Int(n) if n < 0 => StatResult::Directory,
        Literal::Int(n) => StatResult::File(n as u64),
        _ => return Err(Error::desync("stat: unexpected literal shape")),
    })
}

/// `tree(path)`, recursively.
pub fn tree<T: Transport>(engine: &mut ReplEngine<T>, path: &str) -> Result<TreeNode> {
    let lit = run_literal(engine, &helpers::tree(path))?;
    let top = lit.as_seq().ok_or_else(|| Error::desync("tree: expected a tuple"))?;
    let size = top.first().and_then(Literal::as_int).unwrap_or(0) as u64;
    let children = top.get(1).and_then(build_children).ok();
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    Ok(TreeNode {
        name,
        total_size: size,
        children,
    })
}

fn build_children(lit: &Literal) -> std::result::Result<Vec<TreeNode>, ()> {
    let seq = match lit {
        Literal::None => return Err(()),
        other => other.as_seq().ok_or(())?,
    };
    let mut out = Vec::with_capacity(seq.len());
    for item in seq {
        let fields = item.as_seq().ok_or(())?;
        let name = fields.first().and_then(Literal::as_str).ok_or(())?.to_string();
        let total_size = fields.get(1).and_then(Literal::as_int).unwrap_or(0) as u64;
        let children = fields.get(2).and_then(build_children).ok();
        out.push(TreeNode {
            name,
            total_size,
            children,
        });
    }
    Ok(out)
}

/// `hashfile(path)`; `None` if the device has no hashing facility.
pub fn hashfile<T: Transport>(engine: &mut ReplEngine<T>, path: &str) -> Result<Option<[u8; 32]>> {
    let lit = run_literal(engine, &helpers::hashfile(path))?;
    match lit {
        Literal::None => Ok(None),
        Literal::Bytes(b) if b.len() == 32 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(&b);
            Ok(Some(out))
        }
        _ => Err(Error::desync("hashfile: unexpected literal shape")),
    }
}

/// Batched `fileinfo({path: expected_size})`.
pub fn fileinfo<T: Transport>(
    engine: &mut ReplEngine<T>,
    expected: &[(String, u64)],
) -> Result<Vec<(String, FileInfo)>> {
    if expected.is_empty() {
        return Ok(Vec::new());
    }
    let lit = run_literal(engine, &helpers::fileinfo(expected))?;
    let pairs = lit.as_pairs().ok_or_else(|| Error::desync("fileinfo: expected a dict"))?;
    let mut out = Vec::with_capacity(pairs.len());
    for (k, v) in pairs {
        let path = k.as_str().ok_or_else(|| Error::desync("fileinfo: non-string key"))?.to_string();
        let info = match v {
            Literal::None => FileInfo::Absent,
            other => {
                let fields = other.as_seq().ok_or_else(|| Error::desync("fileinfo: bad entry"))?;
                let size = fields.first().and_then(Literal::as_int).unwrap_or(0) as u64;
                match fields.get(1) {
                    Some(Literal::Bytes(h)) if h.len() == 32 => {
                        let mut hash = [0u8; 32];
                        hash.copy_from_slice(h);
                        FileInfo::Match { size, hash }
                    }
                    _ => FileInfo::SizeMismatch(size),
                }
            }
        };
        out.push((path, info));
    }
    Ok(out)
}

/// `mkdir(path)`, ensuring every intermediate component exists.
pub fn mkdir<T: Transport>(engine: &mut ReplEngine<T>, path: &str) -> Result<()> {
    run_literal(engine, &helpers::mkdir(path))?;
    Ok(())
}

/// Recursive `delete(path)`.
pub fn delete<T: Transport>(engine: &mut ReplEngine<T>, path: &str) -> Result<()> {
    let result = engine.exec_raw(helpers::delete(path).as_bytes(), DEFAULT_TIMEOUT);
    match result {
        Err(Error::CmdError { stderr_text, .. }) if stderr_text.contains("ENOENT") => {
            Err(Error::PathNotFound { path: path.into() })
        }
        other => other.map(|_| ()),
    }
}

/// `rename(src, dst)`.
pub fn rename<T: Transport>(engine: &mut ReplEngine<T>, src: &str, dst: &str) -> Result<()> {
    run_literal(engine, &helpers::rename(src, dst))?;
    Ok(())
}

/// `getcwd()`.
pub fn getcwd<T: Transport>(engine: &mut ReplEngine<T>) -> Result<String> {
    let lit = run_literal(engine, &helpers::getcwd())?;
    lit.as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::desync("getcwd: expected a string"))
}

/// `chdir(path)`.
pub fn chdir<T: Transport>(engine: &mut ReplEngine<T>, path: &str) -> Result<()> {
    run_literal(engine, &helpers::chdir(path))?;
    Ok(())
}

/// `sys.path`, as reported by the device.
pub fn get_sys_path<T: Transport>(engine: &mut ReplEngine<T>) -> Result<Vec<String>> {
    let lit = run_literal(engine, &helpers::get_sys_path())?;
    let seq = lit.as_seq().ok_or_else(|| Error::desync("sys.path: expected a list"))?;
    seq.iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| Error::desync("sys.path: non-string entry")))
        .collect()
}

/// Replace `sys.path` entirely.
pub fn set_sys_path<T: Transport>(engine: &mut ReplEngine<T>, entries: &[String]) -> Result<()> {
    run_literal(engine, &helpers::edit_sys_path(helpers::PathEdit::Set, entries))?;
    Ok(())
}

/// Prepend entries (deduplicated, moved to the front if already present).
pub fn prepend_sys_path<T: Transport>(engine: &mut ReplEngine<T>, entries: &[String]) -> Result<()> {
    run_literal(engine, &helpers::edit_sys_path(helpers::PathEdit::Prepend, entries))?;
    Ok(())
}

/// Append entries (deduplicated, moved to the back if already present).
pub fn append_sys_path<T: Transport>(engine: &mut ReplEngine<T>, entries: &[String]) -> Result<()> {
    run_literal(engine, &helpers::edit_sys_path(helpers::PathEdit::Append, entries))?;
    Ok(())
}

/// Remove entries from `sys.path`.
pub fn remove_from_sys_path<T: Transport>(engine: &mut ReplEngine<T>, entries: &[String]) -> Result<()> {
    run_literal(engine, &helpers::edit_sys_path(helpers::PathEdit::Remove, entries))?;
    Ok(())
}

/// One-time helper installation; idempotent, but callers should gate this
/// behind the session's installed-helpers flag to avoid the round-trip.
pub fn install_helpers<T: Transport>(engine: &mut ReplEngine<T>) -> Result<()> {
    engine.exec_raw(helpers::INSTALL_HELPERS.as_bytes(), DEFAULT_TIMEOUT)?;
    Ok(())
}

pub mod transfer_chunk;
pub use transfer_chunk::{get, put, Encoding, PutOutcome};
