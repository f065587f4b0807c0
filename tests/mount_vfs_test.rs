//! Host-side filesystem servicing ([`boardlink::mount::vfs`]) exercised
//! directly through [`boardlink::mount::MountTable::handle`], without any
//! REPL engine: path-traversal rejection, read-only enforcement, empty
//! directories, and a full open/write/close/open/read round trip.

use boardlink::mount::frame::{Frame, Reader, RequestKind, VfsErrorCode, Writer};
use boardlink::mount::{Mount, MountTable};

fn stat_frame(path: &str) -> Frame {
    Frame {
        kind: RequestKind::Stat.as_byte(),
        payload: Writer::new().str(path).finish(),
    }
}

fn listdir_frame(path: &str) -> Frame {
    Frame {
        kind: RequestKind::ListDir.as_byte(),
        payload: Writer::new().str(path).finish(),
    }
}

fn open_frame(path: &str, mode: u8) -> Frame {
    Frame {
        kind: RequestKind::Open.as_byte(),
        payload: Writer::new().str(path).u8(mode).finish(),
    }
}

fn read_frame(handle: u16, n: u32) -> Frame {
    Frame {
        kind: RequestKind::Read.as_byte(),
        payload: Writer::new().u16(handle).u32(n).finish(),
    }
}

fn write_frame(handle: u16, data: &[u8]) -> Frame {
    Frame {
        kind: RequestKind::Write.as_byte(),
        payload: Writer::new().u16(handle).bytes(data).finish(),
    }
}

fn close_frame(handle: u16) -> Frame {
    Frame {
        kind: RequestKind::Close.as_byte(),
        payload: Writer::new().u16(handle).finish(),
    }
}

#[test]
fn stat_reports_absent_file_and_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("present.txt"), b"hi").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    let mut table = MountTable::new();
    table.add(Mount::new("/remote".into(), dir.path().to_path_buf(), false, 0));

    let absent = table.handle("/remote", &stat_frame("missing.txt"));
    let mut r = Reader::new(&absent.payload);
    assert_eq!(r.read_u8(), Some(0));

    let file = table.handle("/remote", &stat_frame("present.txt"));
    let mut r = Reader::new(&file.payload);
    assert_eq!(r.read_u8(), Some(2));
    assert_eq!(r.read_u32(), Some(2));

    let subdir = table.handle("/remote", &stat_frame("sub"));
    let mut r = Reader::new(&subdir.payload);
    assert_eq!(r.read_u8(), Some(1));
}

#[test]
fn listdir_on_empty_directory_returns_empty_sequence_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut table = MountTable::new();
    table.add(Mount::new("/remote".into(), dir.path().to_path_buf(), false, 0));

    let reply = table.handle("/remote", &listdir_frame(""));
    assert_ne!(reply.kind, boardlink::mount::frame::ERROR_REPLY_KIND);
    let mut r = Reader::new(&reply.payload);
    assert_eq!(r.read_u32(), Some(0));
}

#[test]
fn path_traversal_is_rejected_regardless_of_spelling() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("visible")).unwrap();
    let mut table = MountTable::new();
    table.add(Mount::new("/remote".into(), dir.path().join("visible"), true, 0));

    for traversal in ["../secret.txt", "..//../secret.txt", "a/../../secret.txt"] {
        let reply = table.handle("/remote", &open_frame(traversal, b'w'));
        assert_eq!(reply.kind, boardlink::mount::frame::ERROR_REPLY_KIND);
        assert_eq!(reply.payload[0], VfsErrorCode::PermissionDenied as u8);
    }
}

#[test]
fn read_only_mount_rejects_write_open_and_mkdir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"data").unwrap();
    let mut table = MountTable::new();
    table.add(Mount::new("/remote".into(), dir.path().to_path_buf(), false, 0));

    let reply = table.handle("/remote", &open_frame("a.txt", b'w'));
    assert_eq!(reply.kind, boardlink::mount::frame::ERROR_REPLY_KIND);
    assert_eq!(reply.payload[0], VfsErrorCode::PermissionDenied as u8);

    let mkdir = Frame {
        kind: RequestKind::Mkdir.as_byte(),
        payload: Writer::new().str("newdir").finish(),
    };
    let reply = table.handle("/remote", &mkdir);
    assert_eq!(reply.kind, boardlink::mount::frame::ERROR_REPLY_KIND);
}

#[test]
fn open_write_close_then_open_read_round_trips_the_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let mut table = MountTable::new();
    table.add(Mount::new("/remote".into(), dir.path().to_path_buf(), true, 0));

    let open_reply = table.handle("/remote", &open_frame("new.txt", b'w'));
    let mut r = Reader::new(&open_reply.payload);
    let handle = r.read_u16().expect("open returns a handle");

    table.handle("/remote", &write_frame(handle, b"payload bytes"));
    table.handle("/remote", &close_frame(handle));

    let open_reply = table.handle("/remote", &open_frame("new.txt", b'r'));
    let mut r = Reader::new(&open_reply.payload);
    let handle = r.read_u16().expect("reopen returns a handle");

    let read_reply = table.handle("/remote", &read_frame(handle, 64));
    let mut r = Reader::new(&read_reply.payload);
    assert_eq!(r.read_bytes_to_end(), b"payload bytes");
}

#[test]
fn read_on_a_closed_handle_is_a_bad_handle_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"data").unwrap();
    let mut table = MountTable::new();
    table.add(Mount::new("/remote".into(), dir.path().to_path_buf(), false, 0));

    let open_reply = table.handle("/remote", &open_frame("a.txt", b'r'));
    let mut r = Reader::new(&open_reply.payload);
    let handle = r.read_u16().unwrap();
    table.handle("/remote", &close_frame(handle));

    let reply = table.handle("/remote", &read_frame(handle, 4));
    assert_eq!(reply.kind, boardlink::mount::frame::ERROR_REPLY_KIND);
    assert_eq!(reply.payload[0], VfsErrorCode::BadHandle as u8);
}

#[test]
fn unknown_mount_point_is_not_found() {
    let mut table = MountTable::new();
    let reply = table.handle("/nope", &stat_frame("x"));
    assert_eq!(reply.kind, boardlink::mount::frame::ERROR_REPLY_KIND);
    assert_eq!(reply.payload[0], VfsErrorCode::NotFound as u8);
}

#[test]
fn two_simultaneous_mounts_are_routed_by_their_distinct_index() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    std::fs::write(dir_a.path().join("a.txt"), b"from a").unwrap();
    std::fs::write(dir_b.path().join("a.txt"), b"from b").unwrap();

    let mut table = MountTable::new();
    table.add(Mount::new("/sda".into(), dir_a.path().to_path_buf(), false, 0));
    table.add(Mount::new("/sdb".into(), dir_b.path().to_path_buf(), false, 1));

    assert_eq!(table.mount_point_for_index(0), Some("/sda"));
    assert_eq!(table.mount_point_for_index(1), Some("/sdb"));
    assert_eq!(table.mount_point_for_index(2), None);

    // A request naming `/sda`'s own handle must see `/sda`'s file, never
    // `/sdb`'s, even though both mounts hold a file of the same name.
    let open_a = table.handle("/sda", &open_frame("a.txt", b'r'));
    let mut r = Reader::new(&open_a.payload);
    let handle_a = r.read_u16().unwrap();
    let read_a = table.handle("/sda", &read_frame(handle_a, 64));
    let mut r = Reader::new(&read_a.payload);
    assert_eq!(r.read_bytes_to_end(), b"from a");

    let open_b = table.handle("/sdb", &open_frame("a.txt", b'r'));
    let mut r = Reader::new(&open_b.payload);
    let handle_b = r.read_u16().unwrap();
    let read_b = table.handle("/sdb", &read_frame(handle_b, 64));
    let mut r = Reader::new(&read_b.payload);
    assert_eq!(r.read_bytes_to_end(), b"from b");
}
