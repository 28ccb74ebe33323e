//! Finished-Log Compression
//!
//! Finished logs over a configured size floor are transparently replaced by
//! a compressed copy; readers try the compressed variant before the plain
//! file. Compression is CPU/I/O heavy, so it runs on the blocking pool and
//! never holds up log state - the caller offloads with
//! `tokio::task::spawn_blocking` semantics via these async wrappers.
//!
//! Failure is best-effort by design: if compression fails, the plain file is
//! left in place and the caller logs the error; build completion is never
//! blocked on it.

use crate::config::CompressMethod;
use crate::error::{Error, Result};
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Path of the compressed variant of a log file.
pub fn compressed_path(path: &Path, method: CompressMethod) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(method.suffix());
    PathBuf::from(name)
}

/// Compress a finished log file, replacing the plain file on success.
///
/// Writes to a temporary sibling first so a crash mid-compression never
/// leaves a half-written compressed variant shadowing the plain file.
/// Returns the path of the compressed copy.
pub async fn compress_file(path: &Path, method: CompressMethod) -> Result<PathBuf> {
    let plain = path.to_path_buf();
    let target = compressed_path(path, method);
    let target_clone = target.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut tmp = target_clone.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut input = std::fs::File::open(&plain)?;
        let output = std::fs::File::create(&tmp)?;
        let mut encoder = GzEncoder::new(output, Compression::default());
        std::io::copy(&mut input, &mut encoder)?;
        encoder.finish()?.sync_data()?;

        std::fs::rename(&tmp, &target_clone)?;
        std::fs::remove_file(&plain)?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Compression(format!("compression task panicked: {e}")))??;

    Ok(target)
}

/// Read and decompress a compressed log variant in full.
pub async fn read_compressed(path: &Path, method: CompressMethod) -> Result<Bytes> {
    let path = path.to_path_buf();
    let data = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let file = std::fs::File::open(&path)?;
        let mut decoded = Vec::new();
        match method {
            CompressMethod::Gzip => {
                GzDecoder::new(file).read_to_end(&mut decoded)?;
            }
        }
        Ok(decoded)
    })
    .await
    .map_err(|e| Error::Compression(format!("decompression task panicked: {e}")))??;

    Ok(Bytes::from(data))
}
