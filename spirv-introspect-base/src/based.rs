use bytemuck::{Pod, Zeroable};
use std::marker::PhantomData;

const INVALID_BYTE_OFFSET: u32 = u32::MAX;

/// A typed byte offset into a `ByteArena`. This is the relocatable replacement for a pointer: it
/// stays valid when the arena's storage moves, and must be resolved against the arena's current
/// bytes every time it is dereferenced.
///
/// The default value is the "invalid" sentinel, which resolves to `None`.
#[repr(C)]
pub struct BasedOffset<T> {
    byte_offset: u32,
    phantom_data: PhantomData<T>,
}

impl<T> BasedOffset<T> {
    pub const INVALID: Self = BasedOffset {
        byte_offset: INVALID_BYTE_OFFSET,
        phantom_data: PhantomData,
    };

    pub fn from_byte_offset(byte_offset: u32) -> Self {
        BasedOffset {
            byte_offset,
            phantom_data: PhantomData,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.byte_offset != INVALID_BYTE_OFFSET
    }

    pub fn byte_offset(&self) -> u32 {
        self.byte_offset
    }

    /// Offset to the `count`th element after this one, assuming a contiguous array of `T`
    pub fn offset_by(
        self,
        count: usize,
    ) -> Self {
        assert!(self.is_valid());
        let byte_offset = self.byte_offset as usize + count * std::mem::size_of::<T>();
        assert!(byte_offset < INVALID_BYTE_OFFSET as usize);
        Self::from_byte_offset(byte_offset as u32)
    }

    /// Reinterpret as a handle to a different type at the same location
    pub fn cast<U>(self) -> BasedOffset<U> {
        BasedOffset {
            byte_offset: self.byte_offset,
            phantom_data: PhantomData,
        }
    }
}

impl<T: Pod> BasedOffset<T> {
    pub fn resolve<'a>(
        &self,
        base: &'a [u8],
    ) -> Option<&'a T> {
        if !self.is_valid() {
            return None;
        }

        let begin = self.byte_offset as usize;
        Some(bytemuck::from_bytes(
            &base[begin..begin + std::mem::size_of::<T>()],
        ))
    }

    pub fn resolve_mut<'a>(
        &self,
        base: &'a mut [u8],
    ) -> Option<&'a mut T> {
        if !self.is_valid() {
            return None;
        }

        let begin = self.byte_offset as usize;
        Some(bytemuck::from_bytes_mut(
            &mut base[begin..begin + std::mem::size_of::<T>()],
        ))
    }
}

impl<T> Default for BasedOffset<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<T> Clone for BasedOffset<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BasedOffset<T> {}

impl<T> PartialEq for BasedOffset<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.byte_offset == other.byte_offset
    }
}

impl<T> Eq for BasedOffset<T> {}

impl<T> std::hash::Hash for BasedOffset<T> {
    fn hash<H: std::hash::Hasher>(
        &self,
        state: &mut H,
    ) {
        self.byte_offset.hash(state)
    }
}

impl<T> std::fmt::Debug for BasedOffset<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "BasedOffset({})", self.byte_offset)
        } else {
            write!(f, "BasedOffset(INVALID)")
        }
    }
}

// SAFETY: a single u32 plus a zero-sized marker, no padding, any bit pattern is a valid offset
unsafe impl<T: 'static> Zeroable for BasedOffset<T> {}
unsafe impl<T: 'static> Pod for BasedOffset<T> {}

/// A typed, counted range of elements inside a `ByteArena`. Like `BasedOffset`, it must be resolved
/// against the arena's current bytes. An empty span resolves to an empty slice regardless of its
/// offset.
#[repr(C)]
pub struct BasedSpan<T> {
    byte_offset: u32,
    len: u32,
    phantom_data: PhantomData<T>,
}

impl<T> BasedSpan<T> {
    pub fn new(
        byte_offset: u32,
        len: u32,
    ) -> Self {
        BasedSpan {
            byte_offset,
            len,
            phantom_data: PhantomData,
        }
    }

    pub fn empty() -> Self {
        Self::new(INVALID_BYTE_OFFSET, 0)
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_offset(&self) -> u32 {
        self.byte_offset
    }

    /// Handle to the element at `index`
    pub fn element(
        &self,
        index: usize,
    ) -> BasedOffset<T> {
        assert!(index < self.len());
        BasedOffset::from_byte_offset(self.byte_offset).offset_by(index)
    }
}

impl<T: Pod> BasedSpan<T> {
    pub fn resolve<'a>(
        &self,
        base: &'a [u8],
    ) -> &'a [T] {
        if self.is_empty() {
            return &[];
        }

        let begin = self.byte_offset as usize;
        let end = begin + self.len() * std::mem::size_of::<T>();
        bytemuck::cast_slice(&base[begin..end])
    }

    pub fn resolve_mut<'a>(
        &self,
        base: &'a mut [u8],
    ) -> &'a mut [T] {
        if self.is_empty() {
            return &mut [];
        }

        let begin = self.byte_offset as usize;
        let end = begin + self.len() * std::mem::size_of::<T>();
        bytemuck::cast_slice_mut(&mut base[begin..end])
    }
}

impl BasedSpan<u8> {
    /// Strings are only ever written from a `&str`, so they are always valid UTF-8
    pub fn resolve_str<'a>(
        &self,
        base: &'a [u8],
    ) -> &'a str {
        std::str::from_utf8(self.resolve(base)).unwrap_or_default()
    }
}

impl<T> Default for BasedSpan<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Clone for BasedSpan<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BasedSpan<T> {}

impl<T> PartialEq for BasedSpan<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.byte_offset == other.byte_offset && self.len == other.len
    }
}

impl<T> Eq for BasedSpan<T> {}

impl<T> std::hash::Hash for BasedSpan<T> {
    fn hash<H: std::hash::Hasher>(
        &self,
        state: &mut H,
    ) {
        self.byte_offset.hash(state);
        self.len.hash(state);
    }
}

impl<T> std::fmt::Debug for BasedSpan<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "BasedSpan({}, len={})", self.byte_offset, self.len)
    }
}

// SAFETY: two u32s plus a zero-sized marker, no padding, any bit pattern is valid
unsafe impl<T: 'static> Zeroable for BasedSpan<T> {}
unsafe impl<T: 'static> Pod for BasedSpan<T> {}
