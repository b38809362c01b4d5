//! Blob codec for run-detail fields
//!
//! Every blob starts with a small header so incompatible or foreign bytes
//! are rejected with [`Error::Decode`] instead of being misread:
//!
//! ```text
//! magic "RVBL" | version u8 | kind u8 | format_len u8 | format (UTF-8) | payload
//! ```
//!
//! The payload is MessagePack produced by `rmp-serde`.
//!
//! ## Example
//!
//! ```rust
//! use runvault::codec;
//! use runvault::experiment::ParamSet;
//!
//! let params = ParamSet::new().with("n_estimators", 40_i64).with("max_depth", 20_i64);
//! let bytes = codec::encode(&params)?;
//! let decoded: ParamSet = codec::decode(&bytes)?;
//! assert_eq!(decoded, params);
//! # Ok::<(), runvault::Error>(())
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::experiment::ParamSet;
use crate::{Error, Result};

/// Leading bytes of every blob.
pub const BLOB_MAGIC: [u8; 4] = *b"RVBL";

/// Current blob format version. Older versions are accepted, newer rejected.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_FIXED_LEN: usize = BLOB_MAGIC.len() + 3;

/// Category of value stored in a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlobKind {
    /// A single hyperparameter mapping.
    ParamSet = 1,
    /// Ordered list of hyperparameter mappings.
    ParamSets = 2,
    /// Ordered list of floats (scores, timings).
    Series = 3,
    /// Fitted model.
    Model = 4,
}

impl BlobKind {
    const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::ParamSet),
            2 => Some(Self::ParamSets),
            3 => Some(Self::Series),
            4 => Some(Self::Model),
            _ => None,
        }
    }
}

/// A value that can be stored as a blob.
pub trait Blob: Serialize + DeserializeOwned {
    /// Kind written into the header.
    const KIND: BlobKind;
    /// Format identifier written into the header; decode requires an exact match.
    const FORMAT: &'static str;
}

impl Blob for ParamSet {
    const KIND: BlobKind = BlobKind::ParamSet;
    const FORMAT: &'static str = "param_set";
}

impl Blob for Vec<ParamSet> {
    const KIND: BlobKind = BlobKind::ParamSets;
    const FORMAT: &'static str = "param_sets";
}

impl Blob for Vec<f64> {
    const KIND: BlobKind = BlobKind::Series;
    const FORMAT: &'static str = "f64_series";
}

/// Parsed blob header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    /// Format version the blob was written with.
    pub version: u8,
    /// Value category.
    pub kind: BlobKind,
    /// Format identifier (e.g. "random_forest").
    pub format: String,
    /// Offset of the payload in the blob.
    pub payload_offset: usize,
}

/// Encode a value into a self-describing blob.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the payload cannot be produced.
pub fn encode<T: Blob>(value: &T) -> Result<Vec<u8>> {
    let format = T::FORMAT.as_bytes();
    let format_len = u8::try_from(format.len()).map_err(|_| {
        Error::Serialization(format!("format identifier too long: {}", T::FORMAT))
    })?;

    let payload = rmp_serde::to_vec(value)
        .map_err(|e| Error::Serialization(format!("{} payload: {e}", T::FORMAT)))?;

    let mut out = Vec::with_capacity(HEADER_FIXED_LEN + format.len() + payload.len());
    out.extend_from_slice(&BLOB_MAGIC);
    out.push(FORMAT_VERSION);
    out.push(T::KIND as u8);
    out.push(format_len);
    out.extend_from_slice(format);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Read and validate the blob header.
///
/// # Errors
///
/// Returns [`Error::Decode`] on truncated input, wrong magic, unsupported
/// version, or unknown kind.
pub fn read_header(bytes: &[u8]) -> Result<BlobHeader> {
    if bytes.len() < HEADER_FIXED_LEN {
        return Err(Error::Decode(format!(
            "blob truncated: {} bytes, header needs at least {HEADER_FIXED_LEN}",
            bytes.len()
        )));
    }
    if bytes[..BLOB_MAGIC.len()] != BLOB_MAGIC {
        return Err(Error::Decode("not a runvault blob (bad magic)".to_string()));
    }

    let version = bytes[4];
    if version == 0 || version > FORMAT_VERSION {
        return Err(Error::Decode(format!(
            "unsupported blob format version {version} (this build reads up to {FORMAT_VERSION})"
        )));
    }

    let kind = BlobKind::from_byte(bytes[5])
        .ok_or_else(|| Error::Decode(format!("unknown blob kind {}", bytes[5])))?;

    let format_len = usize::from(bytes[6]);
    let payload_offset = HEADER_FIXED_LEN + format_len;
    let format_bytes = bytes
        .get(HEADER_FIXED_LEN..payload_offset)
        .ok_or_else(|| Error::Decode("blob truncated inside format identifier".to_string()))?;
    let format = std::str::from_utf8(format_bytes)
        .map_err(|e| Error::Decode(format!("format identifier is not UTF-8: {e}")))?
        .to_string();

    Ok(BlobHeader { version, kind, format, payload_offset })
}

/// Decode a blob produced by [`encode`].
///
/// # Errors
///
/// Returns [`Error::Decode`] if the header does not match `T` or the payload
/// is malformed.
pub fn decode<T: Blob>(bytes: &[u8]) -> Result<T> {
    let header = read_header(bytes)?;
    if header.kind != T::KIND {
        return Err(Error::Decode(format!(
            "blob kind mismatch: expected {:?}, found {:?}",
            T::KIND,
            header.kind
        )));
    }
    if header.format != T::FORMAT {
        return Err(Error::Decode(format!(
            "blob format mismatch: expected {:?}, found {:?}",
            T::FORMAT,
            header.format
        )));
    }

    rmp_serde::from_slice(&bytes[header.payload_offset..])
        .map_err(|e| Error::Decode(format!("{} payload: {e}", T::FORMAT)))
}

/// Opaque, versioned blob holding a fitted model.
///
/// The store never looks inside; only [`ModelArtifact::decode`] with the
/// matching model type reconstructs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    format: String,
    bytes: Vec<u8>,
}

impl ModelArtifact {
    /// Serialize a fitted model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the model cannot be encoded.
    pub fn from_model<M: Blob>(model: &M) -> Result<Self> {
        Ok(Self { format: M::FORMAT.to_string(), bytes: encode(model)? })
    }

    /// Wrap bytes read back from storage, validating the header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the bytes are not a model blob.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let header = read_header(&bytes)?;
        if header.kind != BlobKind::Model {
            return Err(Error::Decode(format!(
                "expected a model blob, found {:?}",
                header.kind
            )));
        }
        Ok(Self { format: header.format, bytes })
    }

    /// Reconstruct the model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `M` does not match the stored format.
    pub fn decode<M: Blob>(&self) -> Result<M> {
        decode(&self.bytes)
    }

    /// Format identifier of the stored model.
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Raw blob bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Blob size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the blob is empty (never true for a valid artifact).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Content hash in `algorithm:hex_digest` form.
    #[must_use]
    pub fn cas_hash(&self) -> String {
        format!("sha256:{}", hex_digest(&Sha256::digest(&self.bytes)))
    }
}

pub(crate) fn hex_digest(digest: &[u8]) -> String {
    use std::fmt::Write;

    digest.iter().fold(String::with_capacity(digest.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let bytes = encode(&vec![0.5_f64, 0.75]).unwrap();
        assert_eq!(&bytes[..4], b"RVBL");
        assert_eq!(bytes[4], FORMAT_VERSION);
        assert_eq!(bytes[5], BlobKind::Series as u8);

        let header = read_header(&bytes).unwrap();
        assert_eq!(header.format, "f64_series");
        assert_eq!(header.payload_offset, HEADER_FIXED_LEN + "f64_series".len());
    }

    #[test]
    fn test_series_round_trip() {
        let scores = vec![0.91, 0.935, 0.9275, f64::MIN_POSITIVE];
        let decoded: Vec<f64> = decode(&encode(&scores).unwrap()).unwrap();
        assert_eq!(decoded, scores);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let bytes = encode(&vec![1.0_f64]).unwrap();
        let err = decode::<ParamSet>(&bytes).unwrap_err();
        assert!(matches!(err, Error::Decode(msg) if msg.contains("kind mismatch")));
    }

    #[test]
    fn test_future_version_rejected() {
        let mut bytes = encode(&vec![1.0_f64]).unwrap();
        bytes[4] = FORMAT_VERSION + 1;
        let err = decode::<Vec<f64>>(&bytes).unwrap_err();
        assert!(matches!(err, Error::Decode(msg) if msg.contains("unsupported blob format version")));
    }

    #[test]
    fn test_truncated_rejected() {
        assert!(matches!(read_header(b"RVB"), Err(Error::Decode(_))));
        assert!(matches!(read_header(b"RVBL\x01\x03\x20ab"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = encode(&vec![1.0_f64]).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode::<Vec<f64>>(&bytes), Err(Error::Decode(_))));
    }

    #[test]
    fn test_model_artifact_rejects_non_model_blob() {
        let bytes = encode(&ParamSet::new()).unwrap();
        assert!(matches!(ModelArtifact::from_bytes(bytes), Err(Error::Decode(_))));
    }

    #[test]
    fn test_hex_digest() {
        assert_eq!(hex_digest(&[0x00, 0xab, 0x10]), "00ab10");
    }
}
