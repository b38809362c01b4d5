//! Archiver - durable flush, compression and cleanup of run databases
//!
//! Every file this module produces is written to a temporary sibling first
//! and renamed into place only once complete, so a crash never leaves a
//! truncated database or archive at the destination path.
//!
//! ## Container format
//!
//! ```text
//! magic "RVAR" | version u8 | codec u8 | name_len u16 | name (UTF-8)
//!   | content_len u64 | sha256 [32] | payload_len u64 | payload
//! ```
//!
//! All integers are little-endian. A container holds exactly one entry: the
//! database file under its base name.

use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::codec::hex_digest;
use crate::experiment::MetadataStore;
use crate::{Error, Result};

/// Leading bytes of every archive.
pub const ARCHIVE_MAGIC: [u8; 4] = *b"RVAR";

/// Current container version.
pub const ARCHIVE_VERSION: u8 = 1;

/// Default ZSTD level.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Compression algorithm for archive payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// ZSTD - Better ratio (default)
    #[default]
    Zstd,
    /// LZ4 - Fast compression
    Lz4,
}

impl Compression {
    /// Get algorithm name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Zstd => "zstd",
            Self::Lz4 => "lz4",
        }
    }

    const fn code(self) -> u8 {
        match self {
            Self::Zstd => 0,
            Self::Lz4 => 1,
        }
    }

    const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Zstd),
            1 => Some(Self::Lz4),
            _ => None,
        }
    }

    /// Compress data using this algorithm
    ///
    /// # Errors
    /// Returns error if compression fails (e.g., ZSTD internal error)
    pub fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Self::Zstd => zstd::encode_all(data, level).map_err(|e| {
                Error::Io(std::io::Error::other(format!("ZSTD compression failed: {e}")))
            }),
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        }
    }

    /// Decompress data using this algorithm
    ///
    /// # Errors
    /// Returns error if decompression fails (e.g., corrupted data)
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Self::Zstd => zstd::decode_all(data)
                .map_err(|e| Error::Decode(format!("ZSTD decompression failed: {e}"))),
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| Error::Decode(format!("LZ4 decompression failed: {e}"))),
        }
    }
}

/// Header fields of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Stored entry name (base name of the archived file).
    pub entry_name: String,
    /// Payload codec.
    pub compression: Compression,
    /// Uncompressed size in bytes.
    pub content_len: u64,
    /// Compressed payload size in bytes.
    pub payload_len: u64,
    /// SHA-256 of the uncompressed content, `sha256:<hex>`.
    pub content_hash: String,
}

/// Flushes stores to disk, compresses the result, and cleans up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Archiver {
    compression: Compression,
    zstd_level: i32,
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn staging_file(destination: &Path) -> Result<NamedTempFile> {
    Ok(tempfile::Builder::new()
        .prefix(".runvault-")
        .suffix(".partial")
        .tempfile_in(parent_dir(destination))?)
}

impl Archiver {
    /// Create an archiver using `compression`.
    #[must_use]
    pub const fn new(compression: Compression) -> Self {
        Self { compression, zstd_level: DEFAULT_ZSTD_LEVEL }
    }

    /// Override the ZSTD level (ignored for LZ4).
    #[must_use]
    pub const fn with_zstd_level(mut self, level: i32) -> Self {
        self.zstd_level = level;
        self
    }

    /// Payload codec.
    #[must_use]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// Write a durable copy of `store` to `destination`.
    ///
    /// The copy is produced with `VACUUM INTO` on a staging file in the
    /// destination directory and moved to `destination` only after it is
    /// complete. An existing `destination` is never replaced. On failure
    /// the staging file is deleted and `destination` is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory is missing or unwritable or
    /// `destination` already exists, or [`Error::Sqlite`] if SQLite fails
    /// to write the copy.
    pub fn flush(&self, store: &MetadataStore, destination: &Path) -> Result<()> {
        let staging = staging_file(destination)?.into_temp_path();
        store.vacuum_into(&staging)?;
        staging.persist_noclobber(destination).map_err(|e| Error::Io(e.error))?;

        info!(source = %store.target(), destination = %destination.display(), "flushed store");
        Ok(())
    }

    /// Compress `source` into a one-entry archive at `archive`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if `source` is missing, `archive` already
    /// exists, or the archive cannot be written (e.g. its directory does not
    /// exist). No partial archive is left behind.
    pub fn compress(&self, source: &Path, archive: &Path) -> Result<ArchiveInfo> {
        let entry_name = source
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("source has no UTF-8 file name: {}", source.display()),
                ))
            })?
            .to_string();
        let name_len = u16::try_from(entry_name.len()).map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("entry name too long: {entry_name}"),
            ))
        })?;

        let content = fs::read(source)?;
        let digest = Sha256::digest(&content);
        let payload = self.compression.compress(&content, self.zstd_level)?;

        let mut staging = staging_file(archive)?;
        {
            let file = staging.as_file_mut();
            file.write_all(&ARCHIVE_MAGIC)?;
            file.write_all(&[ARCHIVE_VERSION, self.compression.code()])?;
            file.write_all(&name_len.to_le_bytes())?;
            file.write_all(entry_name.as_bytes())?;
            file.write_all(&(content.len() as u64).to_le_bytes())?;
            file.write_all(&digest)?;
            file.write_all(&(payload.len() as u64).to_le_bytes())?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        staging.persist_noclobber(archive).map_err(|e| Error::Io(e.error))?;

        let info = ArchiveInfo {
            entry_name,
            compression: self.compression,
            content_len: content.len() as u64,
            payload_len: payload.len() as u64,
            content_hash: format!("sha256:{}", hex_digest(&digest)),
        };
        info!(
            source = %source.display(),
            archive = %archive.display(),
            codec = self.compression.as_str(),
            content_len = info.content_len,
            payload_len = info.payload_len,
            "compressed database"
        );
        Ok(info)
    }

    /// Delete `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file is absent (callers treat this
    /// as non-fatal), [`Error::Io`] for other failures.
    pub fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Compress `source` into `archive`, then delete `source`.
    ///
    /// `source` is removed only after the archive is fully written; if
    /// compression fails it stays on disk for a retry. A missing `source`
    /// at cleanup time is logged and ignored.
    ///
    /// # Errors
    ///
    /// Propagates [`Archiver::compress`] errors and non-`NotFound` removal errors.
    pub fn seal(&self, source: &Path, archive: &Path) -> Result<ArchiveInfo> {
        let info = self.compress(source, archive)?;
        match self.remove(source) {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => warn!(error = %e, "cleanup skipped"),
            Err(e) => return Err(e),
        }
        Ok(info)
    }

    /// Read an archive's header without extracting it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if unreadable, [`Error::Decode`] if malformed.
    pub fn inspect(archive: &Path) -> Result<ArchiveInfo> {
        let bytes = fs::read(archive)?;
        Ok(parse(&bytes)?.0)
    }

    /// Extract the archived entry into `directory`, verifying its digest.
    ///
    /// Returns the path of the restored file (`directory/<entry name>`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for malformed containers, unsafe entry
    /// names, or digest mismatches; [`Error::Io`] for filesystem failures,
    /// including an existing file at the restore path.
    pub fn restore(archive: &Path, directory: &Path) -> Result<PathBuf> {
        let bytes = fs::read(archive)?;
        let (info, payload) = parse(&bytes)?;

        let content = info.compression.decompress(payload)?;
        if content.len() as u64 != info.content_len {
            return Err(Error::Decode(format!(
                "archive content is {} bytes, header says {}",
                content.len(),
                info.content_len
            )));
        }
        let actual = format!("sha256:{}", hex_digest(&Sha256::digest(&content)));
        if actual != info.content_hash {
            return Err(Error::Decode(format!(
                "archive digest mismatch: expected {}, found {actual}",
                info.content_hash
            )));
        }

        let destination = directory.join(&info.entry_name);
        let mut staging = staging_file(&destination)?;
        staging.as_file_mut().write_all(&content)?;
        staging.as_file_mut().sync_all()?;
        staging.persist_noclobber(&destination).map_err(|e| Error::Io(e.error))?;

        info!(archive = %archive.display(), restored = %destination.display(), "restored archive");
        Ok(destination)
    }
}

/// Positional reader over the container header.
struct HeaderReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.bytes.len());
        let end = end.ok_or_else(|| Error::Decode(format!("archive truncated reading {what}")))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        let mut buf = [0_u8; 2];
        buf.copy_from_slice(self.take(2, what)?);
        Ok(u16::from_le_bytes(buf))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        let mut buf = [0_u8; 8];
        buf.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(buf))
    }
}

fn parse(bytes: &[u8]) -> Result<(ArchiveInfo, &[u8])> {
    let mut reader = HeaderReader::new(bytes);
    if reader.take(ARCHIVE_MAGIC.len(), "magic")? != ARCHIVE_MAGIC {
        return Err(Error::Decode("not a runvault archive (bad magic)".to_string()));
    }
    let version = reader.u8("version")?;
    if version == 0 || version > ARCHIVE_VERSION {
        return Err(Error::Decode(format!("unsupported archive version {version}")));
    }
    let code = reader.u8("codec")?;
    let compression = Compression::from_code(code)
        .ok_or_else(|| Error::Decode(format!("unknown archive codec {code}")))?;

    let name_len = usize::from(reader.u16("name length")?);
    let name = std::str::from_utf8(reader.take(name_len, "entry name")?)
        .map_err(|e| Error::Decode(format!("entry name is not UTF-8: {e}")))?;
    if name.is_empty() || Path::new(name).file_name() != Some(OsStr::new(name)) {
        return Err(Error::Decode(format!("unsafe entry name {name:?}")));
    }

    let content_len = reader.u64("content length")?;
    let digest = reader.take(32, "digest")?;
    let payload_len = reader.u64("payload length")?;
    let payload_len_usize = usize::try_from(payload_len)
        .map_err(|_| Error::Decode(format!("payload length {payload_len} too large")))?;
    let payload = reader.take(payload_len_usize, "payload")?;
    if reader.pos != bytes.len() {
        return Err(Error::Decode(format!(
            "{} trailing bytes after archive entry",
            bytes.len() - reader.pos
        )));
    }

    let info = ArchiveInfo {
        entry_name: name.to_string(),
        compression,
        content_len,
        payload_len,
        content_hash: format!("sha256:{}", hex_digest(digest)),
    };
    Ok((info, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_as_str() {
        assert_eq!(Compression::Lz4.as_str(), "lz4");
        assert_eq!(Compression::Zstd.as_str(), "zstd");
    }

    #[test]
    fn test_compression_default() {
        assert_eq!(Compression::default(), Compression::Zstd);
    }

    #[test]
    fn test_codec_round_trip() {
        let data = b"hello world hello world hello world".to_vec();
        for codec in [Compression::Zstd, Compression::Lz4] {
            let compressed = codec.compress(&data, DEFAULT_ZSTD_LEVEL).unwrap();
            assert_eq!(codec.decompress(&compressed).unwrap(), data);
        }
    }

    #[test]
    fn test_compresses_repeated_data() {
        let data = vec![0u8; 10000];
        for codec in [Compression::Zstd, Compression::Lz4] {
            let compressed = codec.compress(&data, DEFAULT_ZSTD_LEVEL).unwrap();
            assert!(compressed.len() < data.len() / 10);
        }
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        assert!(matches!(parse(b"NOPE\x01\x00"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_parse_rejects_truncated() {
        let mut bytes = ARCHIVE_MAGIC.to_vec();
        bytes.extend_from_slice(&[ARCHIVE_VERSION, 0, 5, 0, b'a']);
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::Decode(msg) if msg.contains("entry name")));
    }

    #[test]
    fn test_parse_rejects_path_in_name() {
        let name = b"../x.db";
        let mut bytes = ARCHIVE_MAGIC.to_vec();
        bytes.extend_from_slice(&[ARCHIVE_VERSION, 0]);
        bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
        bytes.extend_from_slice(name);
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::Decode(msg) if msg.contains("unsafe entry name")));
    }

    #[test]
    fn test_parent_dir_of_bare_name() {
        assert_eq!(parent_dir(Path::new("runs.db")), Path::new("."));
        assert_eq!(parent_dir(Path::new("out/runs.db")), Path::new("out"));
    }
}
