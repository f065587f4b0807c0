/*!
# Mount Agent + Host Proxy (C6)

Ties the wire framing ([`frame`]), host-side filesystem servicing
([`vfs`]), the demultiplexing transport wrapper ([`proxy`]), and the
device-side shim source ([`device_agent`]) into the operations a
[`crate::session::Session`] exposes: `mount`, `unmount`, and the
re-install-after-soft-reset sweep.
*/

pub mod device_agent;
pub mod frame;
pub mod proxy;
pub mod vfs;

pub use proxy::InterceptingTransport;
pub use vfs::{CompilePolicy, Compiler, Mount, MountTable, NullCompiler};

use crate::error::{Error, Result};
use crate::repl::ReplEngine;
use crate::transport::{ClosedTransport, Transport};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns every live mount for one session and knows how to install, tear
/// down, and re-install them against a boxed, swappable transport.
#[derive(Default)]
pub struct MountManager {
    table: Arc<Mutex<MountTable>>,
    intercepting: bool,
    /// Next mount index to hand out. Never reused within a session, even
    /// across unmount/remount, so a reply for a since-torn-down mount can
    /// never be mistaken for one belonging to whatever reused its slot.
    next_index: u8,
}

impl MountManager {
    pub fn new() -> Self {
        MountManager::default()
    }

    pub fn is_active(&self) -> bool {
        self.intercepting
    }

    /// `mount(local_root, mount_point, writable, compile_policy)`.
    pub fn mount(
        &mut self,
        engine: &mut ReplEngine<Box<dyn Transport>>,
        local_root: impl AsRef<Path>,
        mount_point: &str,
        writable: bool,
        compile_policy: Option<CompilePolicy>,
    ) -> Result<()> {
        let local_root = local_root
            .as_ref()
            .canonicalize()
            .map_err(Error::Transport)?;

        {
            let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            if table.is_nested_in_existing(mount_point) {
                return Err(Error::PermissionDenied {
                    path: PathBuf::from(mount_point),
                });
            }
        }

        let index = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);

        engine.exec_raw(
            device_agent::install_and_mount(mount_point, writable, index).as_bytes(),
            DEFAULT_TIMEOUT,
        )?;

        let mut mount = Mount::new(mount_point.to_string(), local_root, writable, index);
        mount.compile_policy = compile_policy;
        {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.add(mount);
        }

        self.ensure_intercepting(engine);
        log::info!("mounted {mount_point}");
        Ok(())
    }

    /// Wrap the engine's transport the first time any mount goes live.
    /// Subsequent mounts reuse the same wrapper: every live mount's frames
    /// travel the one stream, routed by the index each stamps into its own
    /// requests, so any number of simultaneous mounts share it cleanly.
    fn ensure_intercepting(&mut self, engine: &mut ReplEngine<Box<dyn Transport>>) {
        if self.intercepting {
            return;
        }
        let placeholder: Box<dyn Transport> = Box::new(ClosedTransport);
        let inner = engine.replace_transport(placeholder);
        let wrapped: Box<dyn Transport> = Box::new(InterceptingTransport::new(inner, self.table.clone()));
        let _ = engine.replace_transport(wrapped);
        self.intercepting = true;
    }

    /// Tear down `mount_point`: clears its open-file table and submits an
    /// `unmount` code unit. Leaves the intercepting wrapper installed even
    /// if this was the last mount — harmless, since the demultiplexer is a
    /// no-op when [`MountTable`] is empty.
    pub fn unmount(&mut self, engine: &mut ReplEngine<Box<dyn Transport>>, mount_point: &str) -> Result<()> {
        {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(mut m) = table.remove(mount_point) {
                m.clear_handles();
            }
        }
        engine.exec_raw(device_agent::unmount(mount_point).as_bytes(), DEFAULT_TIMEOUT)?;
        Ok(())
    }

    /// Re-install every live mount in original order after a soft reset,
    /// which destroys all device-side VFS registrations. A mount that fails
    /// to come back is dropped with a logged error; the REPL stays usable.
    pub fn reinstall_all(&mut self, engine: &mut ReplEngine<Box<dyn Transport>>) -> Result<()> {
        let mount_points: Vec<(String, bool, u8)> = {
            let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.iter().map(|m| (m.mount_point.clone(), m.writable, m.index)).collect()
        };
        let mut dropped = Vec::new();
        for (mount_point, writable, index) in &mount_points {
            let result = engine.exec_raw(
                device_agent::install_and_mount(mount_point, *writable, *index).as_bytes(),
                DEFAULT_TIMEOUT,
            );
            if let Err(e) = result {
                log::error!("failed to re-install mount {mount_point}: {e}");
                dropped.push(mount_point.clone());
            }
        }
        if !dropped.is_empty() {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            for mount_point in &dropped {
                table.remove(mount_point);
            }
        }
        {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.clear_all_handles();
        }
        if let Some((first, _, _)) = mount_points.first() {
            let _ = crate::commands::chdir(engine, first);
        }
        Ok(())
    }
}
