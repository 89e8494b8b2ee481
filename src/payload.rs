use log::trace;
use std::cell::Cell;
use std::ffi::c_void;

use crate::offsets;

// ─── Record codec ───────────────────────────────────────────────────

/// The record the chat box routine reads the outgoing message from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatPayload {
    pub text_ptr: usize,
    pub unk1: u64,
    pub text_len: u64,
    pub unk2: u64,
}

impl ChatPayload {
    /// Record for `byte_len` bytes of text at `text_ptr`, followed by a NUL.
    pub fn new(text_ptr: usize, byte_len: usize) -> Self {
        Self {
            text_ptr,
            unk1: offsets::PAYLOAD_UNK1_VALUE,
            text_len: byte_len as u64 + 1,
            unk2: offsets::PAYLOAD_UNK2_VALUE,
        }
    }

    pub fn to_bytes(&self) -> [u8; offsets::PAYLOAD_SIZE] {
        let mut out = [0u8; offsets::PAYLOAD_SIZE];
        write_u64(&mut out, offsets::PAYLOAD_TEXT_PTR, self.text_ptr as u64);
        write_u64(&mut out, offsets::PAYLOAD_UNK1, self.unk1);
        write_u64(&mut out, offsets::PAYLOAD_TEXT_LEN, self.text_len);
        write_u64(&mut out, offsets::PAYLOAD_UNK2, self.unk2);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(Self {
            text_ptr: read_u64(data, offsets::PAYLOAD_TEXT_PTR)? as usize,
            unk1: read_u64(data, offsets::PAYLOAD_UNK1)?,
            text_len: read_u64(data, offsets::PAYLOAD_TEXT_LEN)?,
            unk2: read_u64(data, offsets::PAYLOAD_UNK2)?,
        })
    }
}

fn write_u64(out: &mut [u8], offset: usize, value: u64) {
    out[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .map(u64::from_le_bytes)
}

// ─── Native allocations ─────────────────────────────────────────────

/// Counts blocks handed out to the game and given back.
#[derive(Debug, Default)]
pub struct AllocTracker {
    live: Cell<usize>,
    allocated: Cell<u64>,
    released: Cell<u64>,
}

impl AllocTracker {
    pub fn live(&self) -> usize {
        self.live.get()
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.get()
    }

    pub fn released(&self) -> u64 {
        self.released.get()
    }

    fn on_alloc(&self) {
        self.live.set(self.live.get() + 1);
        self.allocated.set(self.allocated.get() + 1);
    }

    fn on_release(&self) {
        self.live.set(self.live.get() - 1);
        self.released.set(self.released.get() + 1);
    }
}

/// Zeroed, 8-byte aligned memory that is freed when dropped.
pub struct NativeBlock<'a> {
    words: Box<[u64]>,
    len: usize,
    tracker: &'a AllocTracker,
}

impl<'a> NativeBlock<'a> {
    pub fn zeroed(len: usize, tracker: &'a AllocTracker) -> Self {
        let words = vec![0u64; len.div_ceil(8)].into_boxed_slice();
        tracker.on_alloc();
        trace!("alloc native block len={} at {:p}", len, words.as_ptr());
        Self { words, len, tracker }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr() as *const u8
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr() as *mut u8
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), len) }
    }
}

impl Drop for NativeBlock<'_> {
    fn drop(&mut self) {
        trace!("release native block at {:p}", self.words.as_ptr());
        self.tracker.on_release();
    }
}

/// A chat payload laid out in native memory: the NUL-terminated text and the
/// record pointing at it. Both blocks are released together on drop.
pub struct PayloadGuard<'a> {
    record: NativeBlock<'a>,
    text: NativeBlock<'a>,
    payload: ChatPayload,
}

impl<'a> PayloadGuard<'a> {
    /// `alloc_size` is the size of the block handed to the game; never less than the record.
    pub fn build(message: &[u8], alloc_size: usize, tracker: &'a AllocTracker) -> Self {
        let mut text = NativeBlock::zeroed(message.len() + offsets::TEXT_SLACK, tracker);
        let bytes = text.as_bytes_mut();
        bytes[..message.len()].copy_from_slice(message);
        bytes[message.len()] = 0;

        let payload = ChatPayload::new(text.as_ptr() as usize, message.len());
        let mut record = NativeBlock::zeroed(alloc_size.max(offsets::PAYLOAD_SIZE), tracker);
        record.as_bytes_mut()[..offsets::PAYLOAD_SIZE].copy_from_slice(&payload.to_bytes());

        Self { record, text, payload }
    }

    pub fn payload(&self) -> &ChatPayload {
        &self.payload
    }

    pub fn record_ptr(&mut self) -> *mut c_void {
        self.record.as_mut_ptr() as *mut c_void
    }

    pub fn record_len(&self) -> usize {
        self.record.len()
    }

    pub fn text_capacity(&self) -> usize {
        self.text.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout_matches_offsets() {
        let bytes = ChatPayload::new(0x1122_3344_5566_7788, 5).to_bytes();
        assert_eq!(&bytes[0..8], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &64u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &6u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &[0u8; 8]);
    }

    #[test]
    fn from_bytes_needs_full_record() {
        assert!(ChatPayload::from_bytes(&[0u8; 31]).is_none());
        let p = ChatPayload::from_bytes(&[0u8; 400]).unwrap();
        assert_eq!(p.text_len, 0);
    }

    #[test]
    fn guard_writes_nul_terminated_text() {
        let tracker = AllocTracker::default();
        let mut guard = PayloadGuard::build(b"Hello", offsets::PAYLOAD_ALLOC_SIZE, &tracker);
        assert_eq!(guard.text_capacity(), 5 + offsets::TEXT_SLACK);
        assert_eq!(guard.record_len(), 400);
        assert_eq!(guard.payload().text_len, 6);

        let record = guard.record.as_bytes();
        assert_eq!(record.len(), 400);
        let payload = ChatPayload::from_bytes(record).unwrap();
        assert_eq!(payload, *guard.payload());
        assert!(record[offsets::PAYLOAD_SIZE..].iter().all(|&b| b == 0));

        let text = guard.text.as_bytes();
        assert_eq!(payload.text_ptr, text.as_ptr() as usize);
        assert_eq!(&text[..payload.text_len as usize], b"Hello\0");
        assert!(text[payload.text_len as usize..].iter().all(|&b| b == 0));

        // The pointer handed to the game is the block read above.
        assert_eq!(guard.record_ptr() as *const u8, guard.record.as_ptr());
    }

    #[test]
    fn native_block_is_zeroed_and_sized() {
        let tracker = AllocTracker::default();
        let mut block = NativeBlock::zeroed(13, &tracker);
        assert_eq!(block.len(), 13);
        assert!(block.as_bytes().iter().all(|&b| b == 0));

        block.as_bytes_mut()[12] = 0xAB;
        assert_eq!(block.as_bytes()[12], 0xAB);
        assert_eq!(tracker.live(), 1);
        drop(block);
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn tiny_alloc_size_still_fits_record() {
        let tracker = AllocTracker::default();
        let guard = PayloadGuard::build(b"x", 1, &tracker);
        assert_eq!(guard.record_len(), offsets::PAYLOAD_SIZE);
    }

    #[test]
    fn guard_releases_both_blocks() {
        let tracker = AllocTracker::default();
        {
            let _guard = PayloadGuard::build(b"abc", 400, &tracker);
            assert_eq!(tracker.live(), 2);
        }
        assert_eq!(tracker.live(), 0);
        assert_eq!(tracker.allocated(), 2);
        assert_eq!(tracker.released(), 2);
    }
}
