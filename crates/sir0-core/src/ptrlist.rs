//! Codec for the container's pointer-slot list.
//!
//! The list is a sequence of base-128 varints, most-significant group first,
//! high bit as continuation. Each decoded value is a delta added to a running
//! offset (initially 0); a fully decoded value of 0 terminates the list.
//! Slot offsets are strictly increasing, so a real delta is never 0 — two
//! slots at byte distance 0 are a caller precondition violation, not a case
//! the codec can represent.

use crate::error::{Result, Sir0Error};

/// Decodes the pointer list starting at `offset`, returning the absolute
/// slot offsets in file order.
pub fn decode(data: &[u8], offset: usize) -> Result<Vec<u64>> {
    let mut pos = offset;
    let mut slots = Vec::new();
    let mut running: u64 = 0;
    loop {
        let mut value: u64 = 0;
        loop {
            let b = *data
                .get(pos)
                .ok_or_else(|| Sir0Error::format(pos, "pointer list runs past end of buffer"))?;
            pos += 1;
            value = (value << 7) | u64::from(b & 0x7F);
            if b & 0x80 == 0 {
                break;
            }
        }
        if value == 0 {
            return Ok(slots);
        }
        running += value;
        slots.push(running);
    }
}

/// Encodes ascending slot offsets as deltas and appends the terminator byte.
pub fn encode(offsets: &[u64], out: &mut Vec<u8>) {
    let mut prev: u64 = 0;
    for &off in offsets {
        let delta = off - prev;
        prev = off;
        let bits = 64 - delta.leading_zeros() as usize;
        let groups = ((bits + 6) / 7).max(1);
        for i in (0..groups).rev() {
            let mut b = ((delta >> (7 * i)) & 0x7F) as u8;
            if i > 0 {
                b |= 0x80;
            }
            out.push(b);
        }
    }
    out.push(0);
}
