//! Host-side filesystem servicing for the mount agent (C6).
//!
//! One [`MountTable`] lives per session. Each [`Mount`] pins a canonicalised
//! local root; every request path is resolved against the longest-matching
//! submount (if any), then canonicalised again and checked for containment
//! before touching the filesystem, so a request can never escape its root
//! via `..`, repeated slashes, or a symlink.

use super::frame::{Frame, Reader, RequestKind, VfsErrorCode, Writer};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Hook for `.mpy` cross-compilation. Real compilation is out of scope for
/// this crate (§1 names `.mpy` cross-compilation as a domain-specific blob);
/// the default [`NullCompiler`] always declines, which exercises exactly the
/// "falls back to the raw `.py`" path the spec requires.
pub trait Compiler: Send + Sync {
    fn compile(&self, source: &Path, target_bytecode_version: i64) -> io::Result<Vec<u8>>;
}

/// Always declines; every `.py` is served as-is.
pub struct NullCompiler;

impl Compiler for NullCompiler {
    fn compile(&self, _source: &Path, _target_bytecode_version: i64) -> io::Result<Vec<u8>> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

/// Transparent `.mpy` compile-cache policy for a mount.
#[derive(Clone)]
pub struct CompilePolicy {
    pub target_bytecode_version: i64,
    pub compiler: Arc<dyn Compiler>,
}

impl std::fmt::Debug for CompilePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilePolicy")
            .field("target_bytecode_version", &self.target_bytecode_version)
            .finish_non_exhaustive()
    }
}

enum OpenMode {
    Read,
    Write,
    Append,
}

struct OpenFile {
    file: fs::File,
    #[allow(dead_code)]
    mode: OpenMode,
}

/// One active mount: a device path backed by a host directory.
pub struct Mount {
    pub mount_point: String,
    pub local_root: PathBuf,
    pub writable: bool,
    pub submounts: Vec<(String, PathBuf)>,
    pub compile_policy: Option<CompilePolicy>,
    /// The byte the device agent stamps into every request frame it sends
    /// for this mount; how [`MountTable`] tells which live mount a frame on
    /// the shared wire belongs to.
    pub index: u8,
    open_files: HashMap<u16, OpenFile>,
    next_handle: u16,
}

const MAX_HANDLES: usize = 64;

impl Mount {
    pub fn new(mount_point: String, local_root: PathBuf, writable: bool, index: u8) -> Self {
        Mount {
            mount_point,
            local_root,
            writable,
            submounts: Vec::new(),
            compile_policy: None,
            index,
            open_files: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Resolve `path` (device-relative, under this mount) to a host path,
    /// routing through the longest-matching submount first, then requiring
    /// the canonicalised result stay within the chosen root.
    fn resolve(&self, path: &str) -> Result<PathBuf, VfsErrorCode> {
        let relative = path.trim_start_matches('/');
        let (root, rest) = self
            .submounts
            .iter()
            .filter(|(prefix, _)| relative == prefix.as_str() || relative.starts_with(&format!("{prefix}/")))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, root)| (root.clone(), relative[prefix.len()..].trim_start_matches('/').to_string()))
            .unwrap_or_else(|| (self.local_root.clone(), relative.to_string()));

        let candidate = if rest.is_empty() { root.clone() } else { root.join(&rest) };
        contain(&root, &candidate)
    }

    fn alloc_handle(&mut self) -> Result<u16, VfsErrorCode> {
        if self.open_files.len() >= MAX_HANDLES {
            return Err(VfsErrorCode::Other);
        }
        loop {
            let candidate = self.next_handle;
            self.next_handle = self.next_handle.wrapping_add(1);
            if !self.open_files.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Invalidate every open handle, e.g. on teardown or re-mount.
    pub fn clear_handles(&mut self) {
        self.open_files.clear();
    }
}

/// Canonicalise `candidate` and require it stay within `root` (also
/// canonicalised). `candidate` need not exist yet (e.g. a file about to be
/// created): in that case its parent must exist and be contained instead.
fn contain(root: &Path, candidate: &Path) -> Result<PathBuf, VfsErrorCode> {
    let root_canon = root.canonicalize().map_err(|_| VfsErrorCode::NotFound)?;
    let resolved = if candidate.exists() {
        candidate.canonicalize().map_err(|_| VfsErrorCode::Io)?
    } else {
        let parent = candidate.parent().unwrap_or(candidate);
        let parent_canon = parent.canonicalize().map_err(|_| VfsErrorCode::NotFound)?;
        match candidate.file_name() {
            Some(name) => parent_canon.join(name),
            None => parent_canon,
        }
    };
    if resolved == root_canon || resolved.starts_with(&root_canon) {
        Ok(resolved)
    } else {
        Err(VfsErrorCode::PermissionDenied)
    }
}

/// All live mounts for one session, in install order (re-install and LIFO
/// teardown both depend on this order).
#[derive(Default)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    pub fn new() -> Self {
        MountTable::default()
    }

    pub fn add(&mut self, mount: Mount) {
        self.mounts.push(mount);
    }

    pub fn remove(&mut self, mount_point: &str) -> Option<Mount> {
        let idx = self.mounts.iter().position(|m| m.mount_point == mount_point)?;
        Some(self.mounts.remove(idx))
    }

    pub fn is_nested_in_existing(&self, mount_point: &str) -> bool {
        self.mounts.iter().any(|m| {
            mount_point == m.mount_point || mount_point.starts_with(&format!("{}/", m.mount_point))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mount> {
        self.mounts.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Mount> {
        self.mounts.iter_mut()
    }

    pub fn clear_all_handles(&mut self) {
        for m in &mut self.mounts {
            m.clear_handles();
        }
    }

    /// The mount point registered under `index`, if any live mount still
    /// carries it.
    pub fn mount_point_for_index(&self, index: u8) -> Option<&str> {
        self.mounts.iter().find(|m| m.index == index).map(|m| m.mount_point.as_str())
    }

    /// Service one request frame against `mount_point`'s mount, producing the
    /// reply frame. Never panics: any internal failure becomes a framed
    /// [`VfsErrorCode`] reply so the device's blocking request still unblocks.
    pub fn handle(&mut self, mount_point: &str, frame: &Frame) -> Frame {
        let kind = match RequestKind::from_byte(frame.kind) {
            Some(k) => k,
            None => return Frame::error(VfsErrorCode::Other, "unknown request kind"),
        };
        let mount = match self.mounts.iter_mut().find(|m| m.mount_point == mount_point) {
            Some(m) => m,
            None => return Frame::error(VfsErrorCode::NotFound, "no such mount"),
        };
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| dispatch(mount, kind, &frame.payload))) {
            Ok(reply) => reply,
            Err(_) => Frame::error(VfsErrorCode::Other, "internal error servicing request"),
        }
    }
}

fn dispatch(mount: &mut Mount, kind: RequestKind, payload: &[u8]) -> Frame {
    let mut r = Reader::new(payload);
    match kind {
        RequestKind::Stat => {
            let path = match r.read_str() {
                Some(p) => p,
                None => return Frame::error(VfsErrorCode::Other, "bad STAT payload"),
            };
            let resolved = match mount.resolve(&path) {
                Ok(p) => p,
                Err(e) => return Frame::error(e, "path rejected"),
            };
            match fs::metadata(&resolved) {
                Ok(meta) if meta.is_dir() => Frame::reply(kind, Writer::new().u8(1).u32(0).finish()),
                Ok(meta) => Frame::reply(kind, Writer::new().u8(2).u32(meta.len() as u32).finish()),
                Err(_) => Frame::reply(kind, Writer::new().u8(0).finish()),
            }
        }
        RequestKind::ListDir => {
            let path = match r.read_str() {
                Some(p) => p,
                None => return Frame::error(VfsErrorCode::Other, "bad LISTDIR payload"),
            };
            let resolved = match mount.resolve(&path) {
                Ok(p) => p,
                Err(e) => return Frame::error(e, "path rejected"),
            };
            let entries = match fs::read_dir(&resolved) {
                Ok(it) => it,
                Err(_) => return Frame::error(VfsErrorCode::NotFound, "no such directory"),
            };
            let mut w = Writer::new();
            let mut names: Vec<_> = entries.filter_map(|e| e.ok()).collect();
            names.sort_by_key(|e| e.file_name());
            w = w.u32(names.len() as u32);
            for entry in names {
                let meta = match entry.metadata() {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                w = w.str(&name).u8(meta.is_dir() as u8).u32(meta.len() as u32);
            }
            Frame::reply(kind, w.finish())
        }
        RequestKind::Open => {
            let path = match r.read_str() {
                Some(p) => p,
                None => return Frame::error(VfsErrorCode::Other, "bad OPEN payload"),
            };
            let mode_byte = r.read_u8().unwrap_or(b'r');
            if mode_byte != b'r' && !mount.writable {
                return Frame::error(VfsErrorCode::PermissionDenied, "mount is read-only");
            }
            let resolved = match mount.resolve(&path) {
                Ok(p) => p,
                Err(e) => return Frame::error(e, "path rejected"),
            };
            let resolved = serve_compiled(mount, &path, resolved);
            let open_result = match mode_byte {
                b'r' => fs::File::open(&resolved).map(|f| (f, OpenMode::Read)),
                b'w' => fs::File::create(&resolved).map(|f| (f, OpenMode::Write)),
                b'a' => fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&resolved)
                    .map(|f| (f, OpenMode::Append)),
                _ => return Frame::error(VfsErrorCode::Other, "bad open mode"),
            };
            match open_result {
                Ok((file, mode)) => match mount.alloc_handle() {
                    Ok(handle) => {
                        mount.open_files.insert(handle, OpenFile { file, mode });
                        Frame::reply(kind, Writer::new().u16(handle).finish())
                    }
                    Err(e) => Frame::error(e, "too many open files"),
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    Frame::error(VfsErrorCode::NotFound, "no such file")
                }
                Err(_) => Frame::error(VfsErrorCode::Io, "open failed"),
            }
        }
        RequestKind::Read => {
            let handle = match r.read_u16() {
                Some(h) => h,
                None => return Frame::error(VfsErrorCode::Other, "bad READ payload"),
            };
            let n = r.read_u32().unwrap_or(0) as usize;
            let of = match mount.open_files.get_mut(&handle) {
                Some(of) => of,
                None => return Frame::error(VfsErrorCode::BadHandle, "no such handle"),
            };
            use std::io::Read;
            let mut buf = vec![0u8; n];
            match of.file.read(&mut buf) {
                Ok(got) => {
                    buf.truncate(got);
                    Frame::reply(kind, Writer::new().bytes(&buf).finish())
                }
                Err(_) => Frame::error(VfsErrorCode::Io, "read failed"),
            }
        }
        RequestKind::Close => {
            let handle = match r.read_u16() {
                Some(h) => h,
                None => return Frame::error(VfsErrorCode::Other, "bad CLOSE payload"),
            };
            mount.open_files.remove(&handle);
            Frame::reply(kind, Vec::new())
        }
        RequestKind::Write => {
            if !mount.writable {
                return Frame::error(VfsErrorCode::PermissionDenied, "mount is read-only");
            }
            let handle = match r.read_u16() {
                Some(h) => h,
                None => return Frame::error(VfsErrorCode::Other, "bad WRITE payload"),
            };
            let data = r.read_bytes_to_end();
            let of = match mount.open_files.get_mut(&handle) {
                Some(of) => of,
                None => return Frame::error(VfsErrorCode::BadHandle, "no such handle"),
            };
            use std::io::Write;
            match of.file.write(data) {
                Ok(n) => Frame::reply(kind, Writer::new().u32(n as u32).finish()),
                Err(_) => Frame::error(VfsErrorCode::Io, "write failed"),
            }
        }
        RequestKind::Remove => {
            if !mount.writable {
                return Frame::error(VfsErrorCode::PermissionDenied, "mount is read-only");
            }
            let path = match r.read_str() {
                Some(p) => p,
                None => return Frame::error(VfsErrorCode::Other, "bad REMOVE payload"),
            };
            let resolved = match mount.resolve(&path) {
                Ok(p) => p,
                Err(e) => return Frame::error(e, "path rejected"),
            };
            let result = if resolved.is_dir() {
                fs::remove_dir(&resolved)
            } else {
                fs::remove_file(&resolved)
            };
            match result {
                Ok(()) => Frame::reply(kind, Vec::new()),
                Err(_) => Frame::error(VfsErrorCode::NotFound, "remove failed"),
            }
        }
        RequestKind::Mkdir => {
            if !mount.writable {
                return Frame::error(VfsErrorCode::PermissionDenied, "mount is read-only");
            }
            let path = match r.read_str() {
                Some(p) => p,
                None => return Frame::error(VfsErrorCode::Other, "bad MKDIR payload"),
            };
            let resolved = match mount.resolve(&path) {
                Ok(p) => p,
                Err(e) => return Frame::error(e, "path rejected"),
            };
            match fs::create_dir_all(&resolved) {
                Ok(()) => Frame::reply(kind, Vec::new()),
                Err(_) => Frame::error(VfsErrorCode::Io, "mkdir failed"),
            }
        }
        RequestKind::Rename => {
            if !mount.writable {
                return Frame::error(VfsErrorCode::PermissionDenied, "mount is read-only");
            }
            let from = match r.read_str() {
                Some(p) => p,
                None => return Frame::error(VfsErrorCode::Other, "bad RENAME payload"),
            };
            let to = match r.read_str() {
                Some(p) => p,
                None => return Frame::error(VfsErrorCode::Other, "bad RENAME payload"),
            };
            let from = match mount.resolve(&from) {
                Ok(p) => p,
                Err(e) => return Frame::error(e, "path rejected"),
            };
            let to = match mount.resolve(&to) {
                Ok(p) => p,
                Err(e) => return Frame::error(e, "path rejected"),
            };
            match fs::rename(&from, &to) {
                Ok(()) => Frame::reply(kind, Vec::new()),
                Err(_) => Frame::error(VfsErrorCode::Io, "rename failed"),
            }
        }
    }
}

/// If `mount` has a compile policy and `path` is a `.py` not named
/// `boot.py`/`main.py`, try to serve `__pycache__/<name>.mpy` next to the
/// source: a pre-existing `.mpy` sibling wins outright; otherwise the cache
/// is rebuilt when stale or missing, falling back to the `.py` on any
/// compile failure or on an empty source file.
fn serve_compiled(mount: &Mount, device_path: &str, source: PathBuf) -> PathBuf {
    let policy = match &mount.compile_policy {
        Some(p) => p,
        None => return source,
    };
    if !device_path.ends_with(".py") {
        return source;
    }
    let base = device_path.rsplit('/').next().unwrap_or(device_path);
    if base == "boot.py" || base == "main.py" {
        return source;
    }
    let sibling_mpy = source.with_extension("mpy");
    if sibling_mpy.exists() {
        return sibling_mpy;
    }
    let Some(parent) = source.parent() else {
        return source;
    };
    let Some(name) = source.file_name() else {
        return source;
    };
    let cache_dir = parent.join("__pycache__");
    let cache_path = cache_dir.join(Path::new(name).with_extension("mpy"));

    let source_meta = match fs::metadata(&source) {
        Ok(m) => m,
        Err(_) => return source,
    };
    if source_meta.len() == 0 {
        return source;
    }
    let stale = match (source_meta.modified(), fs::metadata(&cache_path).and_then(|m| m.modified())) {
        (Ok(src_mtime), Ok(cache_mtime)) => src_mtime > cache_mtime,
        _ => true,
    };
    if !stale && cache_path.exists() {
        return cache_path;
    }
    match policy.compiler.compile(&source, policy.target_bytecode_version) {
        Ok(bytecode) => {
            if fs::create_dir_all(&cache_dir).is_ok() && fs::write(&cache_path, &bytecode).is_ok() {
                cache_path
            } else {
                source
            }
        }
        Err(_) => source,
    }
}
