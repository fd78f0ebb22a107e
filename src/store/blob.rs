//! On-disk framing of node blobs

use crate::{Error, Result};

/// Stored as-is
const RAW: u8 = 0;
/// zstd frame follows
const ZSTD: u8 = 1;

/// Frame a node encoding for storage, compressing it when `level` is non-zero
pub(crate) fn pack(data: &[u8], level: i32) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() + 1);
    if level == 0 {
        output.push(RAW);
        output.extend_from_slice(data);
    } else {
        output.push(ZSTD);
        output.extend(zstd::encode_all(data, level)?);
    }
    Ok(output)
}

/// Undo [`pack`]
pub(crate) fn unpack(data: &[u8]) -> Result<Vec<u8>> {
    let (&marker, body) = data
        .split_first()
        .ok_or_else(|| Error::Corruption("empty blob".into()))?;

    match marker {
        RAW => Ok(body.to_vec()),
        ZSTD => Ok(zstd::decode_all(body)?),
        other => Err(Error::Corruption(format!("unknown blob marker {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip() {
        let data = b"hello world hello world hello world".to_vec();
        for level in [0, 3, 19] {
            let packed = pack(&data, level).unwrap();
            assert_eq!(unpack(&packed).unwrap(), data, "level {}", level);
        }
    }

    #[test]
    fn test_blob_rejects_garbage() {
        assert!(matches!(unpack(&[]), Err(Error::Corruption(_))));
        assert!(matches!(unpack(&[9, 1, 2]), Err(Error::Corruption(_))));
    }
}
