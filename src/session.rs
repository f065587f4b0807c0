/*!
# Session

[`Session`] is the crate's single entry point: it owns the transport (boxed
so the mount subsystem can wrap it), the REPL engine, the capability cache,
the helper-installed flag, and the live-mounts table, and threads
[`crate::config::SessionConfig`] through every operation that needs it.
*/

use crate::commands::{self, DirEntry, FileInfo, Progress, PutOutcome, StatResult, TreeNode};
use crate::config::{CompressPolicy, Endpoint, SessionConfig};
use crate::error::Result;
use crate::mount::{CompilePolicy, MountManager};
use crate::probe::{self, Capabilities};
use crate::repl::ReplEngine;
use crate::transfer::{self, TransferItem, TransferOptions, TransferStats};
use crate::transport::serial::SerialTransport;
use crate::transport::tcp::TcpTransport;
use crate::transport::Transport;
use std::path::Path;
use std::time::Duration;

/// A running connection to one device, plus everything that must survive a
/// soft reset (mounts, cached capabilities) or must be invalidated by one
/// (helper-installed flag, raw-paste support cache lives inside the engine).
pub struct Session {
    engine: ReplEngine<Box<dyn Transport>>,
    config: SessionConfig,
    mounts: MountManager,
    caps: Option<Capabilities>,
    helpers_installed: bool,
}

impl Session {
    /// Open the configured transport and bring the engine up to
    /// [`crate::repl::ReplState::Raw`].
    pub fn open(config: SessionConfig) -> Result<Self> {
        let transport: Box<dyn Transport> = match &config.endpoint {
            Endpoint::Serial { path, baud_rate } => Box::new(SerialTransport::open(path, *baud_rate)?),
            Endpoint::Tcp { address } => Box::new(TcpTransport::connect(address)?),
        };
        let mut engine = ReplEngine::new(transport);
        engine.enter_raw(config.exec_timeout)?;
        Ok(Session {
            engine,
            config,
            mounts: MountManager::new(),
            caps: None,
            helpers_installed: false,
        })
    }

    /// The validated configuration this session was opened with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The cached platform probe, running it first if this is the first call
    /// since open or the last reset.
    pub fn capabilities(&mut self) -> Result<&Capabilities> {
        self.ensure_helpers()?;
        if self.caps.is_none() {
            self.caps = Some(probe::probe(&mut self.engine)?);
        }
        Ok(self.caps.as_ref().expect("just set"))
    }

    fn ensure_helpers(&mut self) -> Result<()> {
        if !self.helpers_installed {
            commands::install_helpers(&mut self.engine)?;
            self.helpers_installed = true;
        }
        Ok(())
    }

    /// Execute one code unit and return its stdout.
    pub fn exec(&mut self, code: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        Ok(self.engine.exec_raw(code, timeout)?.stdout)
    }

    /// Execute via raw-paste when the device supports it, else downgrade
    /// transparently to a normal raw execute.
    pub fn exec_large(&mut self, code: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        Ok(self.engine.try_raw_paste(code, timeout)?.stdout)
    }

    /// `Ctrl-C`/`Ctrl-C`, safe to call at any time.
    pub fn stop(&mut self) -> Result<()> {
        self.engine.stop()
    }

    /// Soft-reset the interpreter, invalidate every cache this session
    /// keeps, and re-install any live mounts.
    pub fn soft_reset(&mut self) -> Result<()> {
        self.engine.soft_reset(self.config.exec_timeout)?;
        self.helpers_installed = false;
        self.caps = None;
        self.engine.enter_raw(self.config.exec_timeout)?;
        self.mounts.reinstall_all(&mut self.engine)?;
        Ok(())
    }

    /// `import machine; machine.reset()`, reconnect, and re-enter raw REPL.
    pub fn machine_reset(&mut self) -> Result<()> {
        self.engine.machine_reset(self.config.reconnect_timeout)?;
        self.helpers_installed = false;
        self.caps = None;
        self.engine.enter_raw(self.config.exec_timeout)?;
        self.mounts.reinstall_all(&mut self.engine)?;
        Ok(())
    }

    pub fn ls(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        self.ensure_helpers()?;
        commands::ls(&mut self.engine, path)
    }

    pub fn stat(&mut self, path: &str) -> Result<StatResult> {
        commands::stat(&mut self.engine, path)
    }

    pub fn tree(&mut self, path: &str) -> Result<TreeNode> {
        self.ensure_helpers()?;
        commands::tree(&mut self.engine, path)
    }

    pub fn hashfile(&mut self, path: &str) -> Result<Option<[u8; 32]>> {
        self.ensure_helpers()?;
        commands::hashfile(&mut self.engine, path)
    }

    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        commands::mkdir(&mut self.engine, path)
    }

    pub fn delete(&mut self, path: &str) -> Result<()> {
        commands::delete(&mut self.engine, path)
    }

    pub fn rename(&mut self, src: &str, dst: &str) -> Result<()> {
        commands::rename(&mut self.engine, src, dst)
    }

    pub fn getcwd(&mut self) -> Result<String> {
        commands::getcwd(&mut self.engine)
    }

    pub fn chdir(&mut self, path: &str) -> Result<()> {
        commands::chdir(&mut self.engine, path)
    }

    pub fn get_sys_path(&mut self) -> Result<Vec<String>> {
        commands::get_sys_path(&mut self.engine)
    }

    pub fn prepend_sys_path(&mut self, entries: &[String]) -> Result<()> {
        commands::prepend_sys_path(&mut self.engine, entries)
    }

    pub fn append_sys_path(&mut self, entries: &[String]) -> Result<()> {
        commands::append_sys_path(&mut self.engine, entries)
    }

    /// Single-file `get`, chunk size derived from the cached capability
    /// probe unless `config.chunk_size` overrides it.
    pub fn get(&mut self, remote_path: &str, progress: Option<&mut Progress<'_>>) -> Result<Vec<u8>> {
        self.ensure_helpers()?;
        let chunk_size = self.resolve_chunk_size()?;
        commands::get(&mut self.engine, remote_path, chunk_size, progress)
    }

    /// Single-file `put`, resolving compression from `config.compress` or,
    /// if auto, the cached capability probe.
    pub fn put(
        &mut self,
        data: &[u8],
        remote_path: &str,
        progress: Option<&mut Progress<'_>>,
    ) -> Result<PutOutcome> {
        self.ensure_helpers()?;
        let chunk_size = self.resolve_chunk_size()?;
        let caps = self.capabilities()?.clone();
        let compress = resolve_compress(&self.config.compress, &caps, data);
        commands::put(
            &mut self.engine,
            data,
            remote_path,
            chunk_size,
            compress,
            caps.has_deflate,
            progress,
        )
    }

    fn resolve_chunk_size(&mut self) -> Result<usize> {
        if let Some(size) = self.config.chunk_size {
            return Ok(size);
        }
        let caps = self.capabilities()?.clone();
        Ok(transfer::choose_chunk_size(
            &caps,
            &TransferOptions {
                chunk_size: None,
                compress: self.config.compress.resolved(),
                force: self.config.force,
            },
        ))
    }

    /// Batch `put` over many `(local_path, remote_path)` pairs.
    pub fn put_batch(
        &mut self,
        items: &[TransferItem],
        progress: Option<&mut dyn FnMut(&TransferItem, u64, u64)>,
    ) -> Result<TransferStats> {
        self.ensure_helpers()?;
        let caps = self.capabilities()?.clone();
        let options = self.transfer_options();
        transfer::put_batch(&mut self.engine, &caps, items, &options, progress)
    }

    /// Batch `get` over many `(local_path, remote_path)` pairs.
    pub fn get_batch(
        &mut self,
        items: &[TransferItem],
        progress: Option<&mut dyn FnMut(&TransferItem, u64, u64)>,
    ) -> Result<TransferStats> {
        self.ensure_helpers()?;
        let caps = self.capabilities()?.clone();
        let options = self.transfer_options();
        transfer::get_batch(&mut self.engine, &caps, items, &options, progress)
    }

    fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.config.chunk_size,
            compress: self.config.compress.resolved(),
            force: self.config.force,
        }
    }

    /// `fileinfo({path: expected_size})`, the transfer pipeline's skip-phase
    /// primitive exposed directly for callers that want it standalone.
    pub fn fileinfo(&mut self, expected: &[(String, u64)]) -> Result<Vec<(String, FileInfo)>> {
        self.ensure_helpers()?;
        commands::fileinfo(&mut self.engine, expected)
    }

    /// `mount(local_root, mount_point, writable, compile_policy)`.
    pub fn mount(
        &mut self,
        local_root: impl AsRef<Path>,
        mount_point: &str,
        writable: bool,
        compile_policy: Option<CompilePolicy>,
    ) -> Result<()> {
        self.mounts
            .mount(&mut self.engine, local_root, mount_point, writable, compile_policy)
    }

    pub fn unmount(&mut self, mount_point: &str) -> Result<()> {
        self.mounts.unmount(&mut self.engine, mount_point)
    }

    pub fn mounts_active(&self) -> bool {
        self.mounts.is_active()
    }
}

fn resolve_compress(policy: &CompressPolicy, caps: &Capabilities, sample: &[u8]) -> bool {
    match policy.resolved() {
        Some(wanted) => wanted,
        None => {
            let take = sample.len().min(512);
            let looks_like_text = sample[..take]
                .iter()
                .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..0x7f).contains(&b));
            caps.has_deflate && looks_like_text && caps.free_ram > 32 * 1024
        }
    }
}
