use crate::memory::round_size_up_to_alignment_usize;
use crate::{BasedOffset, BasedSpan};
use bytemuck::Pod;

// Backing storage is made of u64 words so that any record with an alignment up to 8 can be viewed
// in place
const ARENA_ALIGNMENT: usize = std::mem::align_of::<u64>();

/// Append-only, growable buffer holding variable-length data addressed by `BasedOffset`/`BasedSpan`.
///
/// Allocations never move previously allocated content relative to the start of the arena, but the
/// underlying storage may be reallocated on growth. Never hold a reference obtained from `bytes()`
/// across an allocation; keep the handle and resolve it again instead.
#[derive(Clone, Default)]
pub struct ByteArena {
    storage: Vec<u64>,
    len: usize,
}

impl ByteArena {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        ByteArena {
            storage: Vec::with_capacity(
                round_size_up_to_alignment_usize(bytes, ARENA_ALIGNMENT) / ARENA_ALIGNMENT,
            ),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `bytes` zeroed bytes aligned to `alignment` and returns the offset of the new region
    pub fn allocate(
        &mut self,
        bytes: usize,
        alignment: usize,
    ) -> usize {
        assert!(alignment.is_power_of_two() && alignment <= ARENA_ALIGNMENT);

        let offset = round_size_up_to_alignment_usize(self.len, alignment);
        let end = offset + bytes;
        assert!(
            end < u32::MAX as usize,
            "byte arena cannot address more than 4GB"
        );

        let word_count = round_size_up_to_alignment_usize(end, ARENA_ALIGNMENT) / ARENA_ALIGNMENT;
        if word_count > self.storage.len() {
            self.storage.resize(word_count, 0);
        }

        self.len = end;
        offset
    }

    /// Allocates zeroed storage for `count` elements of `T`. Zero elements allocates nothing and
    /// returns an empty span.
    pub fn alloc<T: Pod>(
        &mut self,
        count: usize,
    ) -> BasedSpan<T> {
        if count == 0 {
            return BasedSpan::empty();
        }

        let offset = self.allocate(
            std::mem::size_of::<T>() * count,
            std::mem::align_of::<T>(),
        );
        BasedSpan::new(offset as u32, count as u32)
    }

    pub fn alloc_one<T: Pod>(&mut self) -> BasedOffset<T> {
        let offset = self.allocate(std::mem::size_of::<T>(), std::mem::align_of::<T>());
        BasedOffset::from_byte_offset(offset as u32)
    }

    pub fn push<T: Pod>(
        &mut self,
        value: T,
    ) -> BasedOffset<T> {
        let offset = self.alloc_one::<T>();
        if let Some(slot) = offset.resolve_mut(self.bytes_mut()) {
            *slot = value;
        }
        offset
    }

    pub fn push_slice<T: Pod>(
        &mut self,
        values: &[T],
    ) -> BasedSpan<T> {
        let span = self.alloc::<T>(values.len());
        span.resolve_mut(self.bytes_mut()).copy_from_slice(values);
        span
    }

    pub fn push_str(
        &mut self,
        value: &str,
    ) -> BasedSpan<u8> {
        self.push_slice(value.as_bytes())
    }

    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.storage)[..self.len]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.storage)[..self.len]
    }

    pub fn get<T: Pod>(
        &self,
        offset: BasedOffset<T>,
    ) -> Option<&T> {
        offset.resolve(self.bytes())
    }

    pub fn get_mut<T: Pod>(
        &mut self,
        offset: BasedOffset<T>,
    ) -> Option<&mut T> {
        offset.resolve_mut(self.bytes_mut())
    }

    pub fn slice<T: Pod>(
        &self,
        span: BasedSpan<T>,
    ) -> &[T] {
        span.resolve(self.bytes())
    }

    pub fn slice_mut<T: Pod>(
        &mut self,
        span: BasedSpan<T>,
    ) -> &mut [T] {
        span.resolve_mut(self.bytes_mut())
    }

    pub fn str(
        &self,
        span: BasedSpan<u8>,
    ) -> &str {
        span.resolve_str(self.bytes())
    }

    /// Locks the arena against further growth
    pub fn freeze(self) -> FrozenByteArena {
        let mut storage = self.storage;
        storage.shrink_to_fit();
        FrozenByteArena {
            storage: storage.into_boxed_slice(),
            len: self.len,
        }
    }
}

impl PartialEq for ByteArena {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.bytes() == other.bytes()
    }
}

impl Eq for ByteArena {}

impl std::fmt::Debug for ByteArena {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ByteArena").field("len", &self.len).finish()
    }
}

/// A `ByteArena` that can no longer grow. Handles created against the `ByteArena` it was frozen
/// from remain valid.
#[derive(Clone, Default)]
pub struct FrozenByteArena {
    storage: Box<[u64]>,
    len: usize,
}

impl FrozenByteArena {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.storage)[..self.len]
    }

    pub fn get<T: Pod>(
        &self,
        offset: BasedOffset<T>,
    ) -> Option<&T> {
        offset.resolve(self.bytes())
    }

    pub fn slice<T: Pod>(
        &self,
        span: BasedSpan<T>,
    ) -> &[T] {
        span.resolve(self.bytes())
    }

    pub fn str(
        &self,
        span: BasedSpan<u8>,
    ) -> &str {
        span.resolve_str(self.bytes())
    }
}

impl PartialEq for FrozenByteArena {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.bytes() == other.bytes()
    }
}

impl Eq for FrozenByteArena {}

impl std::fmt::Debug for FrozenByteArena {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FrozenByteArena")
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zero_extends() {
        let mut arena = ByteArena::new();
        let span = arena.alloc::<u32>(4);
        assert_eq!(arena.slice(span), &[0, 0, 0, 0]);
        assert_eq!(arena.len(), 16);
    }

    #[test]
    fn test_allocations_are_aligned() {
        let mut arena = ByteArena::new();
        arena.push_str("abc");
        let offset = arena.push(7u64);
        assert_eq!(offset.byte_offset() % 8, 0);
        assert_eq!(arena.get(offset), Some(&7u64));
    }

    #[test]
    fn test_handles_survive_growth() {
        let mut arena = ByteArena::with_capacity(8);
        let name = arena.push_str("position");
        let values = arena.push_slice(&[1u32, 2, 3]);

        // Force the storage to reallocate several times
        for i in 0..1000u32 {
            arena.push(i);
        }

        assert_eq!(arena.str(name), "position");
        assert_eq!(arena.slice(values), &[1, 2, 3]);
    }

    #[test]
    fn test_write_through_handle_after_growth() {
        let mut arena = ByteArena::new();
        let slots = arena.alloc::<u32>(2);
        let _padding = arena.alloc::<u64>(64);
        arena.slice_mut(slots)[1] = 42;
        assert_eq!(arena.slice(slots), &[0, 42]);
    }

    #[test]
    fn test_freeze_keeps_content() {
        let mut arena = ByteArena::new();
        let name = arena.push_str("albedo");
        let value = arena.push(0x1234_5678u32);
        let frozen = arena.clone().freeze();

        assert_eq!(frozen.len(), arena.len());
        assert_eq!(frozen.str(name), "albedo");
        assert_eq!(frozen.get(value), Some(&0x1234_5678u32));
        assert_eq!(frozen.bytes(), arena.bytes());
    }

    #[test]
    fn test_empty_alloc_does_not_grow() {
        let mut arena = ByteArena::new();
        let span = arena.alloc::<u32>(0);
        assert!(span.is_empty());
        assert!(arena.is_empty());
    }
}
