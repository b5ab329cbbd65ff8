//! Per-frame upload rings
//!
//! Vertex, index and uniform data for a frame is bump-allocated from three
//! fixed rings. An allocation that does not fit in the remaining tail
//! starts over at offset 0; the GPU is assumed to have consumed data from
//! earlier frames by then.

use bytemuck::Pod;
use q2wiiu_common::config::ArenaConfig;

use crate::error::{ArenaKind, RefError, RefResult};

pub const ATTRIBUTE_BUFFER_ALIGNMENT: u32 = 64;
pub const INDEX_BUFFER_ALIGNMENT: u32 = 64;
pub const UNIFORM_BUFFER_ALIGNMENT: u32 = 0x100;

/// A region handed out by [`FrameArena::alloc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSlice {
    pub offset: u32,
    pub len: u32,
}

impl ArenaSlice {
    fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..(self.offset + self.len) as usize
    }
}

#[derive(Debug)]
pub struct FrameArena {
    kind: ArenaKind,
    storage: Vec<u8>,
    alignment: u32,
    offset: u32,
    /// Bytes claimed since `begin_frame`, including a skipped tail on wrap.
    frame_used: u32,
    high_water: u32,
    wraps: u32,
    fence_checks: bool,
}

impl FrameArena {
    pub fn new(kind: ArenaKind, capacity: u32, alignment: u32, fence_checks: bool) -> Self {
        Self {
            kind,
            storage: vec![0; capacity as usize],
            alignment,
            offset: 0,
            frame_used: 0,
            high_water: 0,
            wraps: 0,
            fence_checks,
        }
    }

    pub fn kind(&self) -> ArenaKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.storage.len() as u32
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Most bytes any single frame has claimed.
    pub fn high_water(&self) -> u32 {
        self.high_water
    }

    /// Wraps during the current frame.
    pub fn wraps(&self) -> u32 {
        self.wraps
    }

    pub fn frame_bytes(&self) -> u32 {
        self.frame_used
    }

    pub fn begin_frame(&mut self) {
        self.frame_used = 0;
        self.wraps = 0;
    }

    pub fn alloc(&mut self, size: u32) -> RefResult<ArenaSlice> {
        let capacity = self.capacity();
        let requested = size;
        let size = size
            .checked_add(self.alignment - 1)
            .map(|s| s & !(self.alignment - 1))
            .filter(|&s| s <= capacity)
            .ok_or(RefError::ArenaOverrun { kind: self.kind, requested, capacity })?;

        let wrap = self.offset + size > capacity;
        let claimed = if wrap { size + (capacity - self.offset) } else { size };

        if self.frame_used + claimed > capacity {
            if self.fence_checks {
                return Err(RefError::ArenaFence { kind: self.kind });
            }
            log::warn!("{} arena overwrote data of the current frame", self.kind);
        }

        if wrap {
            self.offset = 0;
            self.wraps += 1;
            log::debug!("{} arena wrapped", self.kind);
        }

        let slice = ArenaSlice { offset: self.offset, len: size };
        self.storage[slice.range()].fill(0);
        self.offset += size;
        self.frame_used = self.frame_used.saturating_add(claimed).min(capacity);
        self.high_water = self.high_water.max(self.frame_used);
        Ok(slice)
    }

    /// Copy `data` into a fresh slice.
    pub fn write_pod<T: Pod>(&mut self, data: &[T]) -> RefResult<ArenaSlice> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let slice = self.alloc(bytes.len() as u32)?;
        self.storage[slice.offset as usize..slice.offset as usize + bytes.len()]
            .copy_from_slice(bytes);
        Ok(ArenaSlice { offset: slice.offset, len: bytes.len() as u32 })
    }

    pub fn write_f32s(&mut self, data: &[f32]) -> RefResult<ArenaSlice> {
        self.write_pod(data)
    }

    pub fn write_u16s(&mut self, data: &[u16]) -> RefResult<ArenaSlice> {
        self.write_pod(data)
    }

    pub fn bytes(&self, slice: ArenaSlice) -> &[u8] {
        &self.storage[slice.range()]
    }

    pub fn bytes_mut(&mut self, slice: ArenaSlice) -> &mut [u8] {
        &mut self.storage[slice.range()]
    }
}

/// The three rings used while recording a frame.
#[derive(Debug)]
pub struct FrameArenas {
    pub attribute: FrameArena,
    pub index: FrameArena,
    pub uniform: FrameArena,
}

impl FrameArenas {
    pub fn new(config: &ArenaConfig) -> Self {
        Self {
            attribute: FrameArena::new(
                ArenaKind::Attribute,
                config.attribute_bytes,
                ATTRIBUTE_BUFFER_ALIGNMENT,
                config.fence_checks,
            ),
            index: FrameArena::new(
                ArenaKind::Index,
                config.index_bytes,
                INDEX_BUFFER_ALIGNMENT,
                config.fence_checks,
            ),
            uniform: FrameArena::new(
                ArenaKind::Uniform,
                config.uniform_bytes,
                UNIFORM_BUFFER_ALIGNMENT,
                config.fence_checks,
            ),
        }
    }

    pub fn begin_frame(&mut self) {
        self.attribute.begin_frame();
        self.index.begin_frame();
        self.uniform.begin_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(capacity: u32, fence: bool) -> FrameArena {
        FrameArena::new(ArenaKind::Attribute, capacity, 64, fence)
    }

    #[test]
    fn test_alloc_rounds_to_alignment() {
        let mut a = arena(1024, true);
        let s = a.alloc(10).unwrap();
        assert_eq!(s, ArenaSlice { offset: 0, len: 64 });
        let s = a.alloc(64).unwrap();
        assert_eq!(s.offset, 64);
        let s = a.alloc(65).unwrap();
        assert_eq!(s, ArenaSlice { offset: 128, len: 128 });
        assert_eq!(a.offset(), 256);
    }

    #[test]
    fn test_alloc_zero_fills() {
        let mut a = arena(256, false);
        let s = a.write_pod(&[0xffu8; 200]).unwrap();
        assert!(a.bytes(s).iter().all(|&b| b == 0xff));
        a.begin_frame();
        // wraps onto the old data
        let s = a.alloc(128).unwrap();
        assert_eq!(s.offset, 0);
        assert!(a.bytes(s).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wrap_when_tail_too_small() {
        let mut a = arena(256, true);
        a.alloc(192).unwrap();
        a.begin_frame();
        let s = a.alloc(128).unwrap();
        assert_eq!(s.offset, 0);
        assert_eq!(a.wraps(), 1);
        // skipped tail counts against the frame
        assert_eq!(a.frame_bytes(), 64 + 128);
    }

    #[test]
    fn test_overrun() {
        let mut a = arena(256, true);
        match a.alloc(300) {
            Err(RefError::ArenaOverrun { kind, requested, capacity }) => {
                assert_eq!(kind, ArenaKind::Attribute);
                assert_eq!(requested, 300);
                assert_eq!(capacity, 256);
            }
            other => panic!("expected overrun, got {:?}", other),
        }
        assert!(a.alloc(u32::MAX).is_err());
    }

    // ----------------------------------------------------------------
    // fence
    // ----------------------------------------------------------------

    #[test]
    fn test_fence_detects_overwrite_within_frame() {
        let mut a = arena(256, true);
        a.alloc(128).unwrap();
        a.alloc(64).unwrap();
        assert!(matches!(a.alloc(128), Err(RefError::ArenaFence { kind: ArenaKind::Attribute })));
    }

    #[test]
    fn test_fence_off_wraps_silently() {
        let mut a = arena(256, false);
        a.alloc(128).unwrap();
        a.alloc(64).unwrap();
        let s = a.alloc(128).unwrap();
        assert_eq!(s.offset, 0);
    }

    #[test]
    fn test_new_frame_clears_fence() {
        let mut a = arena(256, true);
        a.alloc(192).unwrap();
        a.begin_frame();
        assert!(a.alloc(64).is_ok());
        assert!(a.alloc(128).is_ok());
    }

    #[test]
    fn test_high_water_survives_frames() {
        let mut a = arena(1024, true);
        a.alloc(500).unwrap();
        a.begin_frame();
        a.alloc(10).unwrap();
        assert_eq!(a.high_water(), 512);
        assert_eq!(a.frame_bytes(), 64);
    }

    #[test]
    fn test_write_pod_keeps_exact_length() {
        let mut a = arena(1024, true);
        let s = a.write_u16s(&[1, 2, 3]).unwrap();
        assert_eq!(s.len, 6);
        assert_eq!(bytemuck::cast_slice::<u8, u16>(a.bytes(s)), &[1, 2, 3]);
        let s = a.write_f32s(&[1.5]).unwrap();
        assert_eq!(s.offset, 64);
    }

    #[test]
    fn test_frame_arenas_use_configured_sizes() {
        let cfg = ArenaConfig {
            attribute_bytes: 4096,
            index_bytes: 2048,
            uniform_bytes: 1024,
            fence_checks: true,
        };
        let mut arenas = FrameArenas::new(&cfg);
        assert_eq!(arenas.attribute.capacity(), 4096);
        assert_eq!(arenas.index.capacity(), 2048);
        let s = arenas.uniform.alloc(4).unwrap();
        assert_eq!(s.len, 0x100);
        arenas.begin_frame();
        assert_eq!(arenas.uniform.frame_bytes(), 0);
    }
}
