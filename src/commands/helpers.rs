//! Device-side helper installation.
//!
//! A handful of small Python functions are installed once per session (and
//! re-installed after any reset) so that expensive, chatty operations —
//! recursive listing, chunked transfer, hashing, multi-file stat — cost one
//! round-trip instead of one per path component.

/// Source of the one-time helper installation code unit.
///
/// Every function is namespaced under `_bl` (arbitrary, just unlikely to
/// collide with anything the user's own code defines) so a single `del _bl`
/// on teardown (not currently issued; helpers live for the process lifetime
/// of the device) would remove the whole surface.
pub const INSTALL_HELPERS: &str = r#"
import os, sys
class _BL:
    @staticmethod
    def tree(path):
        def walk(p):
            st = os.stat(p)
            if st[0] & 0x4000:
                total = 0
                children = []
                for name in sorted(os.listdir(p)):
                    child_path = p + '/' + name if p != '/' else '/' + name
                    csize, cchildren = walk(child_path)
                    total += csize
                    children.append((name, csize, cchildren))
                return total, children
            else:
                return st[6], None
        size, children = walk(path)
        print((size, children))

    @staticmethod
    def hashfile(path):
        try:
            import uhashlib as hashlib
        except ImportError:
            try:
                import hashlib
            except ImportError:
                print(None)
                return
        h = hashlib.sha256()
        with open(path, 'rb') as f:
            while True:
                chunk = f.read(512)
                if not chunk:
                    break
                h.update(chunk)
        print(h.digest())

    @staticmethod
    def fileinfo(expected):
        import uhashlib as hashlib
        out = {}
        for path, size in expected.items():
            try:
                st = os.stat(path)
            except OSError:
                out[path] = None
                continue
            actual_size = st[6]
            if actual_size != size:
                out[path] = (actual_size, None)
                continue
            h = hashlib.sha256()
            with open(path, 'rb') as f:
                while True:
                    chunk = f.read(512)
                    if not chunk:
                        break
                    h.update(chunk)
            out[path] = (actual_size, h.digest())
        print(out)

    def get_open(self, path):
        self._get_f = open(path, 'rb')

    def get_read(self, n):
        d = self._get_f.read(n)
        import ubinascii
        print(ubinascii.b2a_base64(d).decode().strip())

    def get_close(self):
        self._get_f.close()
        self._get_f = None

    def put_open(self, path, append):
        self._put_f = open(path, 'ab' if append else 'wb')

    def put_write_b64(self, data_b64):
        import ubinascii
        self._put_f.write(ubinascii.a2b_base64(data_b64))
        print(None)

    def put_write_deflate(self, data_b64):
        import ubinascii, deflate, io
        raw = ubinascii.a2b_base64(data_b64)
        with deflate.DeflateIO(io.BytesIO(raw), deflate.ZLIB) as d:
            self._put_f.write(d.read())
        print(None)

    def put_close(self):
        self._put_f.close()
        self._put_f = None
        print(None)

    @staticmethod
    def probe():
        info = {
            'platform': sys.platform,
            'version': sys.version,
            'impl': sys.implementation[0] if hasattr(sys, 'implementation') else '',
            'machine': sys.implementation._machine if hasattr(sys.implementation, '_machine') else '',
        }
        try:
            import machine
            info['unique_id'] = machine.unique_id()
            info['free_ram'] = machine.mem_free() if hasattr(machine, 'mem_free') else -1
        except ImportError:
            info['unique_id'] = b''
            info['free_ram'] = -1
        try:
            import gc
            info['free_ram'] = max(info['free_ram'], gc.mem_free())
        except (ImportError, AttributeError):
            pass
        try:
            import deflate
            info['has_deflate'] = True
        except ImportError:
            info['has_deflate'] = False
        try:
            import uhashlib
            info['has_hashlib'] = True
        except ImportError:
            info['has_hashlib'] = False
        info['bytecode_version'] = getattr(sys.implementation, '_mpy', 0)
        print(info)

_bl = _BL()
"#;

/// Builds the code unit for `ls(path)`: a single `print(repr(...))` of the
/// `(name, size_or_none)` sequence, or raises if `path` is absent or a file.
pub fn ls(path: &str) -> String {
    format!(
        "import os as _os\n\
         _p = {path:?}\n\
         print([(_n, (_os.stat(_p + '/' + _n if _p != '/' else '/' + _n)[6] \
         if not _os.stat(_p + '/' + _n if _p != '/' else '/' + _n)[0] & 0x4000 else None)) \
         for _n in sorted(_os.listdir(_p))])",
        path = path
    )
}

/// Builds the code unit for `stat(path)`.
pub fn stat(path: &str) -> String {
    format!(
        "import os as _os\n\
         try:\n\
         \t_st = _os.stat({path:?})\n\
         \tprint(-1 if _st[0] & 0x4000 else _st[6])\n\
         except OSError:\n\
         \tprint(None)",
        path = path
    )
}

/// Builds the code unit for `tree(path)` using the installed helper.
pub fn tree(path: &str) -> String {
    format!("_bl.tree({path:?})", path = path)
}

/// Builds the code unit for `hashfile(path)` using the installed helper.
pub fn hashfile(path: &str) -> String {
    format!(
        "try:\n\
         \t_bl.hashfile({path:?})\n\
         except OSError:\n\
         \tprint(None)",
        path = path
    )
}

/// Builds the code unit for a batched `fileinfo({path: expected_size})`.
pub fn fileinfo(expected: &[(String, u64)]) -> String {
    let mut dict = String::from("{");
    for (path, size) in expected {
        dict.push_str(&format!("{path:?}: {size}, "));
    }
    dict.push('}');
    format!("_bl.fileinfo({dict})")
}

/// Builds the code unit for `mkdir(path)`, creating intermediate components.
pub fn mkdir(path: &str) -> String {
    format!(
        "import os as _os\n\
         _parts = {path:?}.strip('/').split('/')\n\
         _cur = ''\n\
         for _part in _parts:\n\
         \t_cur += '/' + _part\n\
         \ttry:\n\
         \t\t_os.mkdir(_cur)\n\
         \texcept OSError as _e:\n\
         \t\tif _e.args[0] != 17:\n\
         \t\t\traise\n\
         print(None)",
        path = path
    )
}

/// Builds the code unit for recursive `delete(path)`.
pub fn delete(path: &str) -> String {
    format!(
        "import os as _os\n\
         def _rm(p):\n\
         \tst = _os.stat(p)\n\
         \tif st[0] & 0x4000:\n\
         \t\tfor _n in _os.listdir(p):\n\
         \t\t\t_rm(p + '/' + _n if p != '/' else '/' + _n)\n\
         \t\t_os.rmdir(p)\n\
         \telse:\n\
         \t\t_os.remove(p)\n\
         _rm({path:?})\n\
         print(None)",
        path = path
    )
}

/// Builds the code unit for `rename(src, dst)`.
pub fn rename(src: &str, dst: &str) -> String {
    format!(
        "import os as _os\n_os.rename({src:?}, {dst:?})\nprint(None)",
        src = src,
        dst = dst
    )
}

/// Builds the code unit for `getcwd()`.
pub fn getcwd() -> String {
    "import os as _os\nprint(_os.getcwd())".to_string()
}

/// Builds the code unit for `chdir(path)`.
pub fn chdir(path: &str) -> String {
    format!("import os as _os\n_os.chdir({path:?})\nprint(None)", path = path)
}

/// Builds the code unit that prints `sys.path` as a list literal.
pub fn get_sys_path() -> String {
    "import sys as _sys\nprint(list(_sys.path))".to_string()
}

/// Where in `sys.path` a mutator should place the (deduplicated) entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathEdit {
    Prepend,
    Append,
    Remove,
    /// Replace the whole list with exactly the given entries.
    Set,
}

/// Builds the code unit that mutates `sys.path`, always deduplicating so an
/// existing entry is moved rather than duplicated.
pub fn edit_sys_path(edit: PathEdit, entries: &[String]) -> String {
    let list_literal = {
        let mut s = String::from("[");
        for e in entries {
            s.push_str(&format!("{e:?}, "));
        }
        s.push(']');
        s
    };
    let body = match edit {
        PathEdit::Set => format!("_sys.path[:] = {list_literal}"),
        PathEdit::Remove => format!(
            "for _e in {list_literal}:\n\
             \tif _e in _sys.path:\n\
             \t\t_sys.path.remove(_e)"
        ),
        PathEdit::Prepend => format!(
            "for _e in reversed({list_literal}):\n\
             \tif _e in _sys.path:\n\
             \t\t_sys.path.remove(_e)\n\
             \t_sys.path.insert(0, _e)"
        ),
        PathEdit::Append => format!(
            "for _e in {list_literal}:\n\
             \tif _e in _sys.path:\n\
             \t\t_sys.path.remove(_e)\n\
             \t_sys.path.append(_e)"
        ),
    };
    format!("import sys as _sys\n{body}\nprint(None)")
}

/// Builds the code unit for the one-shot platform probe (C7), using the
/// installed helper.
pub fn probe() -> String {
    "_bl.probe()".to_string()
}
