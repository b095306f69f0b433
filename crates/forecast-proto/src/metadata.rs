//! Recovers the wave-height figure the plotter stamps into each forecast PNG.
//!
//! The plotter overwrites the eight bytes right after the first `tEXt` chunk
//! tag with a little-endian `f64`. The value never travels through a
//! structured API, so the player scans the raw payload for it.

/// Chunk tag whose first occurrence precedes the encoded metric.
pub const MARKER: [u8; 4] = *b"tEXt";

/// Width of the encoded metric (one IEEE-754 double).
pub const METRIC_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata marker not present in payload")]
    NotFound,
    #[error("metadata truncated: only {available} of 8 bytes after marker")]
    Truncated { available: usize },
}

/// Decode the metric embedded after the first marker in `bytes`.
pub fn decode(bytes: &[u8]) -> Result<f64, MetadataError> {
    let start = marker_end(bytes).ok_or(MetadataError::NotFound)?;
    let tail = &bytes[start..];
    let raw: [u8; METRIC_WIDTH] = tail
        .get(..METRIC_WIDTH)
        .and_then(|s| s.try_into().ok())
        .ok_or(MetadataError::Truncated {
            available: tail.len(),
        })?;
    Ok(f64::from_le_bytes(raw))
}

/// Index just past the first complete marker, if any.
///
/// Single forward pass with a match counter. On a mismatch the counter drops
/// back to zero, or to one when the breaking byte itself starts a new marker;
/// `tEXt` has no other self-overlap, so that is enough.
fn marker_end(bytes: &[u8]) -> Option<usize> {
    let mut matched = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        if b == MARKER[matched] {
            matched += 1;
            if matched == MARKER.len() {
                return Some(i + 1);
            }
        } else {
            matched = usize::from(b == MARKER[0]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(prefix: &[u8], value: f64, suffix: &[u8]) -> Vec<u8> {
        let mut out = prefix.to_vec();
        out.extend_from_slice(&MARKER);
        out.extend_from_slice(&value.to_le_bytes());
        out.extend_from_slice(suffix);
        out
    }

    #[test]
    fn test_decode_after_junk() {
        let bytes = payload(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRjunk", 3.14, b"IEND");
        assert_eq!(decode(&bytes), Ok(3.14));
    }

    #[test]
    fn test_decode_missing_marker() {
        assert_eq!(decode(b"\x89PNG no chunk here"), Err(MetadataError::NotFound));
        assert_eq!(decode(&[]), Err(MetadataError::NotFound));
        assert_eq!(decode(b"tEX"), Err(MetadataError::NotFound));
    }

    #[test]
    fn test_decode_ends_at_marker() {
        assert_eq!(
            decode(b"junktEXt"),
            Err(MetadataError::Truncated { available: 0 })
        );
        assert_eq!(
            decode(b"tEXt\x01\x02\x03"),
            Err(MetadataError::Truncated { available: 3 })
        );
    }

    #[test]
    fn test_decode_uses_first_occurrence() {
        let mut bytes = payload(b"head", 1.5, b"");
        bytes.extend_from_slice(&payload(b"", 9.75, b""));
        assert_eq!(decode(&bytes), Ok(1.5));
    }

    #[test]
    fn test_broken_prefix_resets_scan() {
        // "tE" then "t" breaks the match but also starts the real marker.
        let bytes = payload(b"xxtE", 2.25, b"");
        assert_eq!(decode(&bytes), Ok(2.25));

        let bytes = payload(b"tEXxtEtE", 4.5, b"");
        assert_eq!(decode(&bytes), Ok(4.5));
    }

    #[test]
    fn test_decode_case_sensitive() {
        let mut bytes = b"TEXT".to_vec();
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        assert_eq!(decode(&bytes), Err(MetadataError::NotFound));
    }
}
