/*!
# Transfer Pipeline (C5)

Batches `put`/`get` over many `(local_path, remote_path)` pairs: probes the
device once, auto-sizes the chunk, skips destinations whose size and
SHA-256 already match the source, then streams the rest.
*/

use crate::commands::{self, Progress};
use crate::error::Result;
use crate::probe::Capabilities;
use crate::repl::ReplEngine;
use crate::transport::Transport;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Candidate chunk sizes, smallest to largest; the pipeline picks the
/// largest that fits within [`MAX_RAM_FRACTION`] of the device's reported
/// free RAM.
const CHUNK_CANDIDATES: [usize; 7] = [512, 1024, 2048, 4096, 8192, 16384, 32768];

/// Upper bound on the fraction of free RAM a single chunk may occupy.
const MAX_RAM_FRACTION: f64 = 0.20;

/// One file to transfer: a host path paired with its device destination.
#[derive(Debug, Clone)]
pub struct TransferItem {
    pub local_path: PathBuf,
    pub remote_path: String,
}

/// Aggregate result of a transfer batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub transferred: usize,
    pub skipped: usize,
    pub bytes_written: u64,
}

/// Direction of one transfer item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Put,
    Get,
}

/// Options controlling a transfer batch, derived from [`crate::config::SessionConfig`].
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Overrides chunk-size auto-sizing when set.
    pub chunk_size: Option<usize>,
    /// `None` = auto (enabled only if the device has `deflate`), `Some(_)` = forced.
    pub compress: Option<bool>,
    /// Bypasses the skip-unchanged phase.
    pub force: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            chunk_size: None,
            compress: None,
            force: false,
        }
    }
}

/// Pick the chunk size to use, honoring an explicit override.
pub fn choose_chunk_size(caps: &Capabilities, options: &TransferOptions) -> usize {
    if let Some(size) = options.chunk_size {
        return size;
    }
    let budget = (caps.free_ram as f64 * MAX_RAM_FRACTION) as i64;
    CHUNK_CANDIDATES
        .iter()
        .rev()
        .find(|&&c| (c as i64) <= budget)
        .copied()
        .unwrap_or(CHUNK_CANDIDATES[0])
}

fn should_compress(caps: &Capabilities, options: &TransferOptions, sample: &[u8]) -> bool {
    match options.compress {
        Some(wanted) => wanted,
        None => caps.has_deflate && looks_like_text(sample) && caps.free_ram > 32 * 1024,
    }
}

fn looks_like_text(sample: &[u8]) -> bool {
    let take = sample.len().min(512);
    sample[..take].iter().all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..0x7f).contains(&b))
}

/// Run a `put` batch: upload every item in `items` from the host to the
/// device, skipping any whose destination already matches by size+hash
/// unless `options.force` is set.
pub fn put_batch<T: Transport>(
    engine: &mut ReplEngine<T>,
    caps: &Capabilities,
    items: &[TransferItem],
    options: &TransferOptions,
    mut progress: Option<&mut dyn FnMut(&TransferItem, u64, u64)>,
) -> Result<TransferStats> {
    let mut stats = TransferStats::default();
    let mut to_send = Vec::new();

    if options.force {
        to_send.extend(items.iter().cloned());
    } else {
        let expected: Result<Vec<(String, u64)>> = items
            .iter()
            .map(|item| Ok((item.remote_path.clone(), fs::metadata(&item.local_path)?.len())))
            .collect();
        let expected = expected?;
        let infos = commands::fileinfo(engine, &expected)?;
        let info_by_path: std::collections::HashMap<_, _> = infos.into_iter().collect();

        for item in items {
            let matches = match info_by_path.get(&item.remote_path) {
                Some(commands::FileInfo::Match { size, hash }) => {
                    let local_size = fs::metadata(&item.local_path)?.len();
                    *size == local_size && *hash == sha256_file(&item.local_path)?
                }
                _ => false,
            };
            if matches {
                stats.skipped += 1;
            } else {
                to_send.push(item.clone());
            }
        }
    }

    let chunk_size = choose_chunk_size(caps, options);
    for item in &to_send {
        let data = fs::read(&item.local_path)?;
        let compress = should_compress(caps, options, &data);
        let mut item_progress = progress.as_deref_mut().map(|cb| {
            let item = item.clone();
            move |sent: u64, total: u64| cb(&item, sent, total)
        });
        let cb: Option<&mut Progress<'_>> = item_progress.as_mut().map(|f| f as &mut Progress<'_>);
        let outcome = commands::put(
            engine,
            &data,
            &item.remote_path,
            chunk_size,
            compress,
            caps.has_deflate,
            cb,
        )?;
        stats.transferred += 1;
        stats.bytes_written += outcome.wire_bytes;
    }
    Ok(stats)
}

/// Run a `get` batch: download every item in `items` from device to host,
/// skipping any whose existing host-side copy already matches by size+hash
/// unless `options.force` is set. The skip phase is a single batched
/// `fileinfo` round-trip, exactly mirroring [`put_batch`] (just with the
/// local file standing in as the side being compared against instead of
/// being the source).
pub fn get_batch<T: Transport>(
    engine: &mut ReplEngine<T>,
    caps: &Capabilities,
    items: &[TransferItem],
    options: &TransferOptions,
    mut progress: Option<&mut dyn FnMut(&TransferItem, u64, u64)>,
) -> Result<TransferStats> {
    let mut stats = TransferStats::default();
    let mut to_fetch = Vec::new();

    if options.force {
        to_fetch.extend(items.iter().cloned());
    } else {
        let mut local_sizes: std::collections::HashMap<&str, u64> = std::collections::HashMap::new();
        let mut expected = Vec::new();
        for item in items {
            if let Ok(meta) = fs::metadata(&item.local_path) {
                local_sizes.insert(item.remote_path.as_str(), meta.len());
                expected.push((item.remote_path.clone(), meta.len()));
            }
        }
        let info_by_path: std::collections::HashMap<_, _> = if expected.is_empty() {
            std::collections::HashMap::new()
        } else {
            commands::fileinfo(engine, &expected)?.into_iter().collect()
        };

        for item in items {
            let matches = match info_by_path.get(&item.remote_path) {
                Some(commands::FileInfo::Match { size, hash }) => {
                    local_sizes.get(item.remote_path.as_str()) == Some(size)
                        && *hash == sha256_file(&item.local_path)?
                }
                _ => false,
            };
            if matches {
                stats.skipped += 1;
            } else {
                to_fetch.push(item.clone());
            }
        }
    }

    let chunk_size = choose_chunk_size(caps, options);
    for item in &to_fetch {
        let mut item_progress = progress.as_deref_mut().map(|cb| {
            let item = item.clone();
            move |got: u64, total: u64| cb(&item, got, total)
        });
        let cb: Option<&mut Progress<'_>> = item_progress.as_mut().map(|f| f as &mut Progress<'_>);
        let data = commands::get(engine, &item.remote_path, chunk_size, cb)?;
        stats.bytes_written += data.len() as u64;
        if let Some(parent) = item.local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&item.local_path, &data)?;
        stats.transferred += 1;
    }
    Ok(stats)
}

fn sha256_file(path: &Path) -> Result<[u8; 32]> {
    let data = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hasher.finalize().into())
}
