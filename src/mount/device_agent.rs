//! Device-side VFS shim source, installed once per mount.
//!
//! The agent registers an `os.mount()`-compatible VFS object at the mount
//! point. Every filesystem call the interpreter makes against that path
//! (`ilistdir`, `stat`, `open`, and file-object `read`/`write`/`close`, plus
//! `mkdir`/`remove`/`rename`) is turned into one framed request written to
//! `sys.stdout.buffer` and answered by a framed reply read back from
//! `sys.stdin.buffer` — the same magic-prefixed wire format the host-side
//! proxy in [`super::frame`] speaks, so the device and host halves of this
//! module are the two ends of one protocol.

/// Python source for the `_BLVFS`/`_BLFile` classes and the `_bl_mount`
/// helper that installs one. Rendered once per mount with `{mount_point}`,
/// `{writable}` and `{index}` substituted; `_bl_mount` is idempotent per
/// path. Every request a mount's vfs or file objects send is prefixed with
/// the mount's index byte, since the host proxy multiplexes every live
/// mount over the one stdin/stdout stream and has no other way to tell
/// which mount a given request belongs to.
pub const MOUNT_AGENT_SOURCE: &str = r#"
import os, sys, ustruct as struct

_BL_MAGIC = b'\xf5\x5a'

def _bl_send(kind, payload):
    sys.stdout.buffer.write(_BL_MAGIC)
    sys.stdout.buffer.write(bytes([kind]))
    sys.stdout.buffer.write(struct.pack('<I', len(payload)))
    sys.stdout.buffer.write(payload)

def _bl_recv():
    magic = sys.stdin.buffer.read(2)
    if magic != _BL_MAGIC:
        raise OSError('mount protocol desync')
    kind = sys.stdin.buffer.read(1)[0]
    (length,) = struct.unpack('<I', sys.stdin.buffer.read(4))
    payload = sys.stdin.buffer.read(length) if length else b''
    if kind == 0xFF:
        raise OSError(payload[1:].decode() if len(payload) > 1 else 'mount error')
    return kind, payload

def _bl_str(s):
    b = s.encode()
    return struct.pack('<H', len(b)) + b

def _bl_request(idx, kind, payload):
    _bl_send(kind, bytes([idx]) + payload)
    return _bl_recv()


class _BLFile:
    def __init__(self, idx, handle):
        self._idx = idx
        self._h = handle

    def read(self, n=-1):
        if n < 0:
            n = 1 << 30
        _, payload = _bl_request(self._idx, 0x04, struct.pack('<HI', self._h, n))
        return payload

    def readinto(self, buf):
        data = self.read(len(buf))
        buf[: len(data)] = data
        return len(data)

    def write(self, data):
        _, payload = _bl_request(self._idx, 0x06, struct.pack('<H', self._h) + data)
        (n,) = struct.unpack('<I', payload)
        return n

    def close(self):
        _bl_request(self._idx, 0x05, struct.pack('<H', self._h))

    def __enter__(self):
        return self

    def __exit__(self, *exc):
        self.close()


class _BLVFS:
    def __init__(self, mount_point, writable, index):
        self.mount_point = mount_point
        self.writable = writable
        self._idx = index

    def _rel(self, path):
        return path

    def mount(self, readonly, mkfs):
        pass

    def umount(self):
        pass

    def chdir(self, path):
        pass

    def getcwd(self):
        return '/'

    def stat(self, path):
        _, payload = _bl_request(self._idx, 0x01, _bl_str(self._rel(path)))
        kind = payload[0]
        if kind == 0:
            raise OSError(2)
        size = struct.unpack('<I', payload[1:5])[0]
        is_dir = kind == 1
        mode = 0x4000 if is_dir else 0x8000
        return (mode, 0, 0, 0, 0, 0, size, 0, 0, 0)

    def ilistdir(self, path):
        _, payload = _bl_request(self._idx, 0x02, _bl_str(self._rel(path)))
        (count,) = struct.unpack('<I', payload[0:4])
        off = 4
        out = []
        for _ in range(count):
            (name_len,) = struct.unpack('<H', payload[off : off + 2])
            off += 2
            name = payload[off : off + name_len].decode()
            off += name_len
            is_dir = payload[off]
            off += 1
            (size,) = struct.unpack('<I', payload[off : off + 4])
            off += 4
            out.append((name, 0x4000 if is_dir else 0x8000, 0, size))
        return iter(out)

    def open(self, path, mode):
        m = 'w' if 'w' in mode else ('a' if 'a' in mode else 'r')
        _, payload = _bl_request(self._idx, 0x03, _bl_str(self._rel(path)) + bytes([ord(m)]))
        (handle,) = struct.unpack('<H', payload)
        return _BLFile(self._idx, handle)

    def mkdir(self, path):
        _bl_request(self._idx, 0x08, _bl_str(self._rel(path)))

    def remove(self, path):
        _bl_request(self._idx, 0x07, _bl_str(self._rel(path)))

    def rmdir(self, path):
        self.remove(path)

    def rename(self, src, dst):
        _bl_request(self._idx, 0x09, _bl_str(self._rel(src)) + _bl_str(self._rel(dst)))


def _bl_mount(mount_point, writable, index):
    vfs = _BLVFS(mount_point, writable, index)
    os.mount(vfs, mount_point)
    return vfs
"#;

/// Builds the code unit that installs the agent (if not already present)
/// and mounts it at `mount_point`, stamping `mount_index` into every frame
/// the device sends for this mount so the host proxy can route it back to
/// the right [`super::vfs::Mount`] without any other state.
pub fn install_and_mount(mount_point: &str, writable: bool, mount_index: u8) -> String {
    format!(
        "{source}\n_bl_mount({mount_point:?}, {writable}, {mount_index})\nprint(None)",
        source = MOUNT_AGENT_SOURCE,
        mount_point = mount_point,
        writable = writable,
        mount_index = mount_index,
    )
}

/// Builds the code unit that unmounts and tears down `mount_point`.
pub fn unmount(mount_point: &str) -> String {
    format!("import os as _os\n_os.umount({mount_point:?})\nprint(None)")
}
