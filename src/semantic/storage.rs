//! Binary storage for vector embeddings.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - provider_id: [u8; 32] (SHA256 fingerprint of the embedding provider)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - note_id: u64 (little-endian)
//! - note_version: u64 (little-endian)
//! - embedding: [f32; dimensions] (little-endian)
//!
//! The file is a cache of provider output, not a source of truth; anything
//! in it can be regenerated from the notes. Callers treat a failed load as
//! "start empty and re-embed".

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::semantic::index::{IndexError, VectorIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + provider_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// SHA256 fingerprint of a provider identity string.
///
/// Stored in the vectors.bin header so a snapshot written under one
/// provider or model is never mistaken for another's.
pub fn provider_fingerprint(provider_id: &str) -> [u8; 32] {
    Sha256::digest(provider_id.as_bytes()).into()
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Provider mismatch: file was written by a different embedding provider")]
    ProviderMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Storage manager for vector embeddings.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    /// Create a new storage manager for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the storage file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load a vector index from storage.
    ///
    /// The header must match the running provider's fingerprint and
    /// dimensions; a snapshot from another provider is useless since its
    /// vectors live in a different space.
    pub fn load(
        &self,
        expected_fingerprint: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        validate_header(&header, expected_fingerprint, expected_dimensions)?;

        let index = VectorIndex::new(header.dimensions as usize);
        for _ in 0..header.entry_count {
            let (id, version, embedding) = read_entry(&mut reader, header.dimensions as usize)?;
            match index.upsert(id, version, embedding) {
                Ok(_) => {}
                Err(IndexError::DimensionMismatch { expected, got }) => {
                    return Err(VectorStorageError::DimensionMismatch { expected, got });
                }
            }
        }

        Ok(index)
    }

    /// Save the vector index to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(
        &self,
        index: &VectorIndex,
        fingerprint: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = write_to_file(&temp_path, index, fingerprint);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        // Atomic rename
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Delete the storage file if it exists.
    pub fn delete(&self) -> Result<(), VectorStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    provider_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

fn write_to_file(
    path: &Path,
    index: &VectorIndex,
    fingerprint: &[u8; 32],
) -> Result<(), VectorStorageError> {
    // Entries are written in id order so identical indexes produce
    // identical files.
    let mut entries = index.snapshot();
    entries.sort_by_key(|(id, _)| *id);

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let header = Header {
        version: FORMAT_VERSION,
        provider_id: *fingerprint,
        dimensions: index.dimensions() as u16,
        entry_count: entries.len() as u64,
    };
    write_header(&mut writer, &header)?;

    for (id, record) in &entries {
        writer.write_all(&id.to_le_bytes())?;
        writer.write_all(&record.version.to_le_bytes())?;
        for &value in record.vector.iter() {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    // Flush and sync
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    Ok(())
}

fn write_header(writer: &mut BufWriter<File>, header: &Header) -> Result<(), VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.provider_id);
    header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

    // Compute and store checksum
    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_header(reader: &mut BufReader<File>) -> Result<Header, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let mut provider_id = [0u8; 32];
    provider_id.copy_from_slice(&header_bytes[1..33]);

    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);

    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header_bytes[35..43]);
    let entry_count = u64::from_le_bytes(count_bytes);

    let mut checksum_bytes = [0u8; 4];
    checksum_bytes.copy_from_slice(&header_bytes[43..47]);
    let stored_checksum = u32::from_le_bytes(checksum_bytes);

    // Verify checksum (computed over header without checksum field)
    let computed_checksum = crc32fast::hash(&header_bytes[0..43]);
    if stored_checksum != computed_checksum {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    Ok(Header {
        version,
        provider_id,
        dimensions,
        entry_count,
    })
}

fn validate_header(
    header: &Header,
    expected_fingerprint: &[u8; 32],
    expected_dimensions: usize,
) -> Result<(), VectorStorageError> {
    if header.provider_id != *expected_fingerprint {
        return Err(VectorStorageError::ProviderMismatch);
    }

    if header.dimensions as usize != expected_dimensions {
        return Err(VectorStorageError::DimensionMismatch {
            expected: expected_dimensions,
            got: header.dimensions as usize,
        });
    }

    Ok(())
}

fn read_entry(
    reader: &mut BufReader<File>,
    dimensions: usize,
) -> Result<(u64, u64, Vec<f32>), VectorStorageError> {
    let mut id_bytes = [0u8; 8];
    reader.read_exact(&mut id_bytes)?;
    let id = u64::from_le_bytes(id_bytes);

    let mut version_bytes = [0u8; 8];
    reader.read_exact(&mut version_bytes)?;
    let version = u64::from_le_bytes(version_bytes);

    // A truncated file fails here with UnexpectedEof
    let mut vector_bytes = vec![0u8; dimensions * 4];
    reader.read_exact(&mut vector_bytes)?;
    let embedding = vector_bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok((id, version, embedding))
}
