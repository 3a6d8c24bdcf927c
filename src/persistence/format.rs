//! On-disk framing for a single persisted section: `b"HRE1"` magic, a u16
//! format version, a big-endian u64 payload length, the postcard-encoded
//! payload itself, and a trailing CRC32 over the payload. Every named file
//! in a generation directory (`hnsw.bin`, `lsh.bin`, `bm25.bin`, `pq.bin`,
//! `embeddings.bin`, `metadata.bin`, `manifest.bin`) is framed this way and
//! can be read back independently of the others.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

use super::error::{PersistenceError, PersistenceResult};

const MAGIC: &[u8; 4] = b"HRE1";
const FORMAT_VERSION: u16 = 1;

/// Encode `value` into the section framing and write it to `writer`.
pub(super) fn write_section<W: Write, T: Serialize>(
    writer: &mut W,
    file_label: &str,
    value: &T,
) -> PersistenceResult<()> {
    let payload = postcard::to_allocvec(value).map_err(PersistenceError::Encode)?;
    let checksum = crc32fast::hash(&payload);

    writer.write_all(MAGIC)?;
    writer.write_u16::<BigEndian>(FORMAT_VERSION)?;
    writer.write_u64::<BigEndian>(payload.len() as u64)?;
    writer.write_all(&payload)?;
    writer.write_u32::<BigEndian>(checksum)?;
    let _ = file_label;
    Ok(())
}

/// Read and validate a section written by [`write_section`], returning the
/// decoded payload.
pub(super) fn read_section<R: Read, T: DeserializeOwned>(
    reader: &mut R,
    file_label: &str,
) -> PersistenceResult<T> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(PersistenceError::BadMagic { file: file_label.to_string() });
    }

    let version = reader.read_u16::<BigEndian>()?;
    if version != FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion { file: file_label.to_string(), version });
    }

    let length = reader.read_u64::<BigEndian>()? as usize;
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;

    let expected_checksum = reader.read_u32::<BigEndian>()?;
    let actual_checksum = crc32fast::hash(&payload);
    if actual_checksum != expected_checksum {
        return Err(PersistenceError::ChecksumMismatch { file: file_label.to_string() });
    }

    postcard::from_bytes(&payload).map_err(PersistenceError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
        b: Vec<String>,
    }

    #[test]
    fn round_trips_a_value_through_the_framing() {
        let value = Sample { a: 7, b: vec!["x".into(), "y".into()] };
        let mut buf = Vec::new();
        write_section(&mut buf, "sample.bin", &value).unwrap();
        let decoded: Sample = read_section(&mut std::io::Cursor::new(buf), "sample.bin").unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn rejects_corrupted_magic_bytes() {
        let value = Sample { a: 1, b: vec![] };
        let mut buf = Vec::new();
        write_section(&mut buf, "sample.bin", &value).unwrap();
        buf[0] = b'X';
        let result: PersistenceResult<Sample> = read_section(&mut std::io::Cursor::new(buf), "sample.bin");
        assert!(matches!(result, Err(PersistenceError::BadMagic { .. })));
    }

    #[test]
    fn rejects_a_flipped_payload_byte_via_checksum() {
        let value = Sample { a: 1, b: vec!["hello".into()] };
        let mut buf = Vec::new();
        write_section(&mut buf, "sample.bin", &value).unwrap();
        let flip_at = buf.len() - 6;
        buf[flip_at] ^= 0xFF;
        let result: PersistenceResult<Sample> = read_section(&mut std::io::Cursor::new(buf), "sample.bin");
        assert!(matches!(result, Err(PersistenceError::ChecksumMismatch { .. })));
    }

    #[test]
    fn rejects_an_unsupported_format_version() {
        let value = Sample { a: 1, b: vec![] };
        let mut buf = Vec::new();
        write_section(&mut buf, "sample.bin", &value).unwrap();
        buf[5] = 0xFF;
        let result: PersistenceResult<Sample> = read_section(&mut std::io::Cursor::new(buf), "sample.bin");
        assert!(matches!(result, Err(PersistenceError::UnsupportedVersion { .. })));
    }
}
