//! Positional wire records for subdomain routing.
//!
//! Every routed list travels as `[subdomain, count, payload[0..count]]`
//! in a flat stream of native-width `u64`. No other framing exists; the
//! receiver walks the stream header by header.

use crate::mesh_error::MeshDdmError;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// Fixed two-word header that precedes every payload.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct WireRecordHdr {
    pub subdomain: u64,
    pub count: u64,
}

const_assert_eq!(size_of::<WireRecordHdr>(), 2 * size_of::<u64>());

/// Number of `u64` words taken by one header.
pub const HDR_WORDS: usize = size_of::<WireRecordHdr>() / size_of::<u64>();

impl WireRecordHdr {
    pub fn new(subdomain: usize, count: usize) -> Self {
        Self {
            subdomain: subdomain as u64,
            count: count as u64,
        }
    }
}

/// Words a record with `count` payload values occupies.
#[inline]
pub fn record_len(count: usize) -> usize {
    HDR_WORDS + count
}

/// Append one record to `out`.
pub fn push_record(out: &mut Vec<u64>, subdomain: usize, payload: &[u64]) {
    let hdr = WireRecordHdr::new(subdomain, payload.len());
    out.extend_from_slice(bytemuck::cast_slice::<WireRecordHdr, u64>(std::slice::from_ref(&hdr)));
    out.extend_from_slice(payload);
}

/// Iterator over the records of a received stream.
pub struct Records<'a> {
    buf: &'a [u64],
    pos: usize,
}

impl<'a> Records<'a> {
    pub fn new(buf: &'a [u64]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<(usize, &'a [u64]), MeshDdmError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        if rest.len() < HDR_WORDS {
            self.pos = self.buf.len();
            return Some(Err(MeshDdmError::WireDecode(format!(
                "truncated header at word {}",
                self.buf.len() - rest.len()
            ))));
        }
        let hdr = WireRecordHdr {
            subdomain: rest[0],
            count: rest[1],
        };
        let count = hdr.count as usize;
        if rest.len() < HDR_WORDS + count {
            self.pos = self.buf.len();
            return Some(Err(MeshDdmError::WireDecode(format!(
                "record for subdomain {} announces {} values, {} left",
                hdr.subdomain,
                count,
                rest.len() - HDR_WORDS
            ))));
        }
        self.pos += record_len(count);
        Some(Ok((
            hdr.subdomain as usize,
            &rest[HDR_WORDS..HDR_WORDS + count],
        )))
    }
}

/// Reinterpret a POD slice as bytes for sending.
pub fn as_bytes<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Decode a received byte buffer into `T`s. The buffer carries no alignment
/// guarantee, so values are read unaligned.
pub fn decode_pod_vec<T: Pod>(bytes: &[u8]) -> Result<Vec<T>, MeshDdmError> {
    let width = size_of::<T>();
    if width == 0 || bytes.len() % width != 0 {
        return Err(MeshDdmError::WireDecode(format!(
            "{} bytes is not a whole number of {width}-byte values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(width)
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_walk_in_order() {
        let mut buf = Vec::new();
        push_record(&mut buf, 3, &[10, 11]);
        push_record(&mut buf, 0, &[]);
        push_record(&mut buf, 7, &[5]);
        assert_eq!(buf.len(), record_len(2) + record_len(0) + record_len(1));

        let recs: Vec<_> = Records::new(&buf).map(|r| r.unwrap()).collect();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0], (3, &[10u64, 11][..]));
        assert_eq!(recs[1].0, 0);
        assert!(recs[1].1.is_empty());
        assert_eq!(recs[2], (7, &[5u64][..]));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let buf = vec![1u64, 4, 9, 9];
        let first = Records::new(&buf).next().unwrap();
        assert!(matches!(first, Err(MeshDdmError::WireDecode(_))));
    }

    #[test]
    fn unaligned_decode() {
        let vals = [1.5f64, -2.0, 3.25];
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(as_bytes(&vals));
        let back: Vec<f64> = decode_pod_vec(&bytes[1..]).unwrap();
        assert_eq!(back, vals);
        assert!(decode_pod_vec::<f64>(&bytes[..5]).is_err());
    }
}
