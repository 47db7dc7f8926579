//! Arena buffer
//!
//! The growable byte buffer holding one pre-order tree encoding. All
//! writes funnel through append/patch primitives here; everything above
//! works in offsets, so growth and relocation never invalidate anything.

use super::layout;

#[derive(Debug, Default)]
pub(crate) struct Arena {
    buf: Vec<u8>,
}

impl Arena {
    pub fn with_capacity(cap: usize) -> Arena {
        Arena {
            buf: Vec::with_capacity(cap),
        }
    }

    /// Current write cursor; the address the next record will get.
    #[inline]
    pub fn cursor(&self) -> u32 {
        self.buf.len() as u32
    }

    /// Append a fully formed record, returning its address.
    pub fn append_record(&mut self, rec: &[u8]) -> u32 {
        let addr = self.cursor();
        self.buf.extend_from_slice(rec);
        addr
    }

    /// Patch a u32 field of an already-appended record.
    #[inline]
    pub fn patch_u32(&mut self, addr: u32, field: usize, v: u32) {
        layout::write_u32(&mut self.buf, addr as usize + field, v);
    }

    /// Add to a u32 field in place (attribute counting).
    #[inline]
    pub fn add_u32(&mut self, addr: u32, field: usize, delta: u32) {
        let at = addr as usize + field;
        let v = layout::read_u32(&self.buf, at) + delta;
        layout::write_u32(&mut self.buf, at, v);
    }

    #[inline]
    pub fn tag(&self, addr: u32) -> u8 {
        self.buf[addr as usize]
    }

    /// Drop everything at and after `addr` (discarding an unused trailing
    /// root record when an archive is finalized).
    pub fn truncate(&mut self, addr: u32) {
        self.buf.truncate(addr as usize);
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_patch() {
        let mut arena = Arena::with_capacity(64);
        assert_eq!(arena.cursor(), 0);
        let a = arena.append_record(&[9, 0, 0, 0, 0, 0, 0, 0]);
        let b = arena.append_record(&[7, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!((a, b), (0, 8));
        arena.patch_u32(a, 4, 0xDEAD);
        arena.add_u32(b, 4, 2);
        assert_eq!(arena.tag(b), 7);
        let buf = arena.into_vec();
        assert_eq!(layout::read_u32(&buf, 4), 0xDEAD);
        assert_eq!(layout::read_u32(&buf, 12), 3);
    }
}
