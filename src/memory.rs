use crate::error::*;

pub const PAGE_SIZE: usize = 65536;
pub const MAX_PAGES: u32 = 65536;

macro_rules! impl_load {
    ($name:ident, $ty:ty, $width:literal) => {
        #[inline]
        pub fn $name(&self, ptr: u32, offset: u32) -> Result<$ty, Error> {
            let at = self.checked_range(ptr, offset, $width)?;
            let mut buf = [0u8; $width];
            buf.copy_from_slice(&self.data[at..at + $width]);
            Ok(<$ty>::from_le_bytes(buf))
        }
    };
}

macro_rules! impl_store {
    ($name:ident, $ty:ty, $width:literal) => {
        #[inline]
        pub fn $name(&mut self, ptr: u32, offset: u32, value: $ty) -> Result<(), Error> {
            let at = self.checked_range(ptr, offset, $width)?;
            self.data[at..at + $width].copy_from_slice(&value.to_le_bytes());
            Ok(())
        }
    };
}

/// A linear memory: a flat byte array sized in 64 KiB pages, growable up to
/// its declared maximum. All accesses are bounds checked against the byte
/// length, and the effective address is computed in 64-bit space so
/// `ptr + offset` cannot wrap.
pub struct MemoryInstance {
    data: Vec<u8>,
    pages: u32,
    max_pages: u32,
}

impl MemoryInstance {
    pub fn new(min_pages: u32, max_pages: u32) -> Self {
        Self {
            data: vec![0; min_pages as usize * PAGE_SIZE],
            pages: min_pages,
            max_pages,
        }
    }

    /// Current size in pages.
    pub fn size(&self) -> u32 {
        self.pages
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Grows by `delta` pages, returning the previous page count, or
    /// `u32::MAX` when the maximum would be exceeded.
    pub fn grow(&mut self, delta: u32) -> u32 {
        let old = self.pages;
        let new = match old.checked_add(delta) {
            Some(n) if n <= self.max_pages => n,
            _ => return u32::MAX,
        };
        self.data.resize(new as usize * PAGE_SIZE, 0);
        self.pages = new;
        old
    }

    #[inline]
    fn checked_range(&self, ptr: u32, offset: u32, width: usize) -> Result<usize, Error> {
        let at = ptr as u64 + offset as u64;
        if at + width as u64 > self.data.len() as u64 {
            return Err(Error::Trap(OOB_MEMORY_ACCESS));
        }
        Ok(at as usize)
    }

    impl_load!(load_u8, u8, 1);
    impl_load!(load_i8, i8, 1);
    impl_load!(load_u32, u32, 4);
    impl_load!(load_i32, i32, 4);
    impl_load!(load_u64, u64, 8);
    impl_load!(load_i64, i64, 8);

    impl_store!(store_u8, u8, 1);
    impl_store!(store_u32, u32, 4);
    impl_store!(store_u64, u64, 8);

    /// Bulk write used for data segments and argv setup.
    pub fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Error> {
        let at = self.checked_range(offset, 0, bytes.len())?;
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_bytes(&self, offset: u32, len: usize) -> Result<&[u8], Error> {
        let at = self.checked_range(offset, 0, len)?;
        Ok(&self.data[at..at + len])
    }
}
