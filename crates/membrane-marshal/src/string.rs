//! Length-framed string records.
//!
//! A string set is a run of records packed back to back with no padding:
//!
//! ```text
//! +-----------+----------------+-----------+-----------+-----
//! | len: u32  | len UTF-8 bytes| len: u32  | bytes ... | ...
//! +-----------+----------------+-----------+-----------+-----
//! ```
//!
//! Lengths are little-endian byte counts. Because records are unpadded,
//! length prefixes are read bytewise rather than through a `u32` view.

use membrane_core::{Address, ArgumentError, BridgeError, EngineError, LinearMemory};
use membrane_memory::ScratchStack;
use tracing::trace;

use crate::array::put_array;

const PREFIX: usize = 4;

/// Encode `strings` as consecutive length-framed records.
///
/// An empty set encodes to an empty buffer.
pub fn encode_strings<S: AsRef<str>>(strings: &[S]) -> Result<Vec<u8>, ArgumentError> {
    let total: usize = strings.iter().map(|s| PREFIX + s.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for s in strings {
        let bytes = s.as_ref().as_bytes();
        let len = u32::try_from(bytes.len()).map_err(|_| ArgumentError::TooLarge {
            what: "string",
            len: bytes.len(),
        })?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(bytes);
    }
    Ok(out)
}

/// Decode `count` records from `bytes` starting at offset `start`.
///
/// Fails with [`EngineError::MalformedString`] if a record runs past the
/// end of `bytes` or is not valid UTF-8.
pub fn decode_records(bytes: &[u8], start: usize, count: usize) -> Result<Vec<String>, EngineError> {
    // Every record needs at least its prefix, so `count` is only trusted
    // as far as the bytes could hold it.
    let fit = bytes.len().saturating_sub(start) / PREFIX;
    let mut strings = Vec::with_capacity(count.min(fit));
    let mut at = start;
    for index in 0..count {
        let malformed = |reason: String| EngineError::MalformedString { index, reason };
        let prefix = at
            .checked_add(PREFIX)
            .and_then(|end| bytes.get(at..end))
            .ok_or_else(|| malformed(format!("length prefix at offset {at} is out of bounds")))?;
        let mut len = [0u8; PREFIX];
        len.copy_from_slice(prefix);
        let len = u32::from_le_bytes(len) as usize;
        let body_start = at + PREFIX;
        let body = body_start
            .checked_add(len)
            .and_then(|end| bytes.get(body_start..end))
            .ok_or_else(|| {
                malformed(format!(
                    "{len} byte body at offset {body_start} runs past the end of memory"
                ))
            })?;
        let s = std::str::from_utf8(body).map_err(|e| malformed(e.to_string()))?;
        strings.push(s.to_owned());
        at = body_start + len;
    }
    Ok(strings)
}

/// Decode `count` records from engine memory at `address`.
pub fn decode_strings<M>(memory: &M, address: Address, count: usize) -> Result<Vec<String>, EngineError>
where
    M: LinearMemory + ?Sized,
{
    let strings = decode_records(memory.bytes(), address.as_usize(), count)?;
    trace!(%address, count, "decoded string records");
    Ok(strings)
}

/// Encode `strings` into fresh scratch space and return its address.
///
/// The records start at a scratch-aligned address. An empty set still
/// reserves a zero-length block so the address is valid to pass on.
pub fn put_strings<S, M>(
    scratch: &mut ScratchStack,
    memory: &mut M,
    strings: &[S],
) -> Result<Address, BridgeError>
where
    S: AsRef<str>,
    M: LinearMemory + ?Sized,
{
    let encoded = encode_strings(strings)?;
    put_array::<u8, M>(scratch, memory, &encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use membrane_test_utils::MockEngine;

    #[test]
    fn records_are_length_prefixed_and_unpadded() {
        let bytes = encode_strings(&["ab", "", "xyz"]).unwrap();
        assert_eq!(
            bytes,
            [
                2, 0, 0, 0, b'a', b'b', //
                0, 0, 0, 0, //
                3, 0, 0, 0, b'x', b'y', b'z',
            ]
        );
    }

    #[test]
    fn empty_set_encodes_to_nothing() {
        assert!(encode_strings::<&str>(&[]).unwrap().is_empty());
        assert!(decode_records(&[], 0, 0).unwrap().is_empty());
    }

    #[test]
    fn multibyte_utf8_lengths_count_bytes() {
        let bytes = encode_strings(&["é"]).unwrap();
        assert_eq!(&bytes[..4], &[2, 0, 0, 0]);
        assert_eq!(decode_records(&bytes, 0, 1).unwrap(), vec!["é"]);
    }

    #[test]
    fn decode_starts_at_offset() {
        let mut bytes = vec![0xff; 3];
        bytes.extend(encode_strings(&["sin", "cos"]).unwrap());
        assert_eq!(decode_records(&bytes, 3, 2).unwrap(), vec!["sin", "cos"]);
    }

    #[test]
    fn truncated_body_is_malformed() {
        let mut bytes = encode_strings(&["ok", "truncated"]).unwrap();
        bytes.truncate(bytes.len() - 1);
        let err = decode_records(&bytes, 0, 2).unwrap_err();
        assert!(matches!(err, EngineError::MalformedString { index: 1, .. }));
    }

    #[test]
    fn missing_prefix_is_malformed() {
        let bytes = encode_strings(&["a"]).unwrap();
        let err = decode_records(&bytes, 0, 2).unwrap_err();
        assert!(matches!(err, EngineError::MalformedString { index: 1, .. }));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let bytes = [2, 0, 0, 0, 0xc3, 0x28];
        let err = decode_records(&bytes, 0, 1).unwrap_err();
        assert!(matches!(err, EngineError::MalformedString { index: 0, .. }));
    }

    #[test]
    fn huge_length_does_not_overflow() {
        let bytes = [0xff, 0xff, 0xff, 0xff];
        assert!(decode_records(&bytes, 0, 1).is_err());
        assert!(decode_records(&bytes, usize::MAX - 1, 1).is_err());
    }

    #[test]
    fn huge_count_is_malformed() {
        let err = decode_records(&[0, 0, 0, 0], 0, usize::MAX / 2).unwrap_err();
        assert!(matches!(err, EngineError::MalformedString { index: 1, .. }));
        let err = decode_records(&[], 0, usize::MAX).unwrap_err();
        assert!(matches!(err, EngineError::MalformedString { index: 0, .. }));
    }

    #[test]
    fn put_then_decode_through_memory() {
        let mut engine = MockEngine::new();
        let base = {
            use membrane_core::EngineBinding;
            engine.reserve_scratch(256).unwrap()
        };
        let mut scratch = ScratchStack::new(base, 256, 16).unwrap();
        let at = put_strings(&mut scratch, &mut engine, &["x", "y"]).unwrap();
        assert_eq!(
            decode_strings(&engine, at, 2).unwrap(),
            vec!["x".to_owned(), "y".to_owned()]
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_inverts_encode(
                strings in proptest::collection::vec(".{0,12}", 0..8),
            ) {
                let bytes = encode_strings(&strings).unwrap();
                prop_assert_eq!(decode_records(&bytes, 0, strings.len()).unwrap(), strings);
            }

            #[test]
            fn encoded_size_is_prefixes_plus_bytes(
                strings in proptest::collection::vec(".{0,12}", 0..8),
            ) {
                let bytes = encode_strings(&strings).unwrap();
                let expected: usize = strings.iter().map(|s| 4 + s.len()).sum();
                prop_assert_eq!(bytes.len(), expected);
            }
        }
    }
}
