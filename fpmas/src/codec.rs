//! The "pack" codec: a linear byte buffer with independent read/write
//! cursors, per spec §4.C.
//!
//! Typed values go through `put`/`get`, built on `serde` + `bincode` (the
//! same serialization crate the teacher uses for `timely`'s own channel
//! payloads). Fixed-width fields whose wire layout must be bit-exact
//! (`DistributedId`, ranks) bypass the typed form entirely through
//! `write_bytes`/`read_bytes`.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CodecError;

/// A byte buffer produced by the codec; the unit of wire transfer.
///
/// `Pack` is a value type: it derives `Clone` and compares by its bytes, not
/// by cursor position, matching spec §4.C ("Packs are value types
/// (copy/move/compare by bytes)").
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pack {
    buf: Vec<u8>,
    write_pos: usize,
    read_pos: usize,
    /// Element count of the most recent fixed-width array written or read,
    /// alongside its byte span. Exposed so callers can sanity-check framing
    /// without re-deriving it (spec §4.C: "carry both the byte length and
    /// the element count for arrays of fixed-size elements").
    last_array: Option<(usize, usize)>,
}

impl Pack {
    pub fn new() -> Self {
        Pack::default()
    }

    pub fn from_bytes(buf: Vec<u8>) -> Self {
        let len = buf.len();
        Pack {
            buf,
            write_pos: len,
            read_pos: 0,
            last_array: None,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Byte length of the buffer written so far.
    pub fn len(&self) -> usize {
        self.write_pos
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == 0
    }

    /// Reserves `n` additional bytes of capacity. A pure capacity hint: it
    /// never changes `len()`.
    pub fn allocate(&mut self, n: usize) {
        self.buf.reserve(n);
    }

    /// Pure query: the number of bytes `put` would write for `value`,
    /// without mutating the pack.
    pub fn size_of<T: Serialize>(value: &T) -> Result<usize, CodecError> {
        bincode::serialized_size(value)
            .map(|n| n as usize)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Appends the binary representation of `value`, advancing the write
    /// cursor by exactly `size_of(value)`.
    pub fn put<T: Serialize>(&mut self, value: &T) -> Result<(), CodecError> {
        let bytes = bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))?;
        self.write_pos += bytes.len();
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }

    /// Decodes the next `T` from the read cursor, advancing it by the number
    /// of bytes actually consumed.
    pub fn get<T: DeserializeOwned>(&mut self) -> Result<T, CodecError> {
        let remaining = &self.buf[self.read_pos..];
        let mut cursor = std::io::Cursor::new(remaining);
        let value = bincode::deserialize_from(&mut cursor)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        self.read_pos += cursor.position() as usize;
        Ok(value)
    }

    /// Low-level write that bypasses the typed form: used for fixed-size
    /// fields whose layout is bit-exact (e.g. `DistributedId`).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.write_pos += bytes.len();
    }

    /// Low-level read counterpart to [`write_bytes`](Self::write_bytes).
    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8], CodecError> {
        let available = self.buf.len() - self.read_pos;
        if available < n {
            return Err(CodecError::Truncated {
                needed: n,
                available,
            });
        }
        let slice = &self.buf[self.read_pos..self.read_pos + n];
        self.read_pos += n;
        Ok(slice)
    }

    /// Writes a length-prefixed array of fixed-width elements using the
    /// supplied raw encoder, tracking the resulting byte span and element
    /// count for later inspection via [`last_array`](Self::last_array).
    pub fn write_fixed_array<T>(&mut self, items: &[T], mut encode: impl FnMut(&T, &mut Vec<u8>)) {
        self.write_bytes(&(items.len() as u64).to_le_bytes());
        let elements_start = self.buf.len();
        for item in items {
            let before = self.buf.len();
            encode(item, &mut self.buf);
            self.write_pos += self.buf.len() - before;
        }
        self.last_array = Some((self.buf.len() - elements_start, items.len()));
    }

    /// Reads back an array written by
    /// [`write_fixed_array`](Self::write_fixed_array).
    pub fn read_fixed_array<T>(
        &mut self,
        mut decode: impl FnMut(&[u8]) -> (T, usize),
    ) -> Result<Vec<T>, CodecError> {
        let count_bytes = self.read_bytes(8)?;
        let count = u64::from_le_bytes(count_bytes.try_into().unwrap()) as usize;
        let elements_start = self.read_pos;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let remaining = &self.buf[self.read_pos..];
            let (item, consumed) = decode(remaining);
            self.read_pos += consumed;
            items.push(item);
        }
        self.last_array = Some((self.read_pos - elements_start, count));
        Ok(items)
    }

    /// `(byte_length, element_count)` of the most recent fixed-width array
    /// operation, if any.
    pub fn last_array(&self) -> Option<(usize, usize)> {
        self.last_array
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn scalar_round_trip() {
        for value in [0i64, 1, -1, i64::MAX, i64::MIN] {
            let mut pack = Pack::new();
            pack.put(&value).unwrap();
            assert_eq!(pack.len(), Pack::size_of(&value).unwrap());
            let back: i64 = pack.get().unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn string_round_trip() {
        let mut pack = Pack::new();
        let s = "hello, fpmas".to_string();
        pack.put(&s).unwrap();
        let back: String = pack.get().unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn sequence_and_map_round_trip() {
        let mut pack = Pack::new();
        let seq = vec![1u32, 2, 3, 4];
        let map: BTreeMap<String, i32> = [("a".to_string(), 1), ("b".to_string(), 2)]
            .into_iter()
            .collect();
        pack.put(&seq).unwrap();
        pack.put(&map).unwrap();
        let seq_back: Vec<u32> = pack.get().unwrap();
        let map_back: BTreeMap<String, i32> = pack.get().unwrap();
        assert_eq!(seq_back, seq);
        assert_eq!(map_back, map);
    }

    #[test]
    fn raw_bytes_bypass_typed_form() {
        let mut pack = Pack::new();
        pack.write_bytes(&[1, 2, 3, 4]);
        assert_eq!(pack.read_bytes(4).unwrap(), &[1, 2, 3, 4]);
        assert!(matches!(
            pack.read_bytes(1),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn fixed_array_tracks_length_and_count() {
        let mut pack = Pack::new();
        let items = [10u32, 20, 30];
        pack.write_fixed_array(&items, |item, out| out.extend_from_slice(&item.to_le_bytes()));
        assert_eq!(pack.last_array(), Some((12, 3)));
        let mut reader = Pack::from_bytes(pack.into_bytes());
        let back = reader
            .read_fixed_array(|bytes| (u32::from_le_bytes(bytes[..4].try_into().unwrap()), 4))
            .unwrap();
        assert_eq!(back, vec![10, 20, 30]);
        assert_eq!(reader.last_array(), Some((12, 3)));
    }
}
