use std::fmt::Display;

use crate::target::WORD_SIZE;

pub const PAGE_SIZE: usize = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VirtAddress {
    pub address: usize,
}

impl VirtAddress {
    pub const fn new(address: usize) -> Self {
        VirtAddress { address }
    }

    pub fn get(self) -> usize {
        self.address
    }

    /// Example 4095 -> 0, 4096 -> 4096
    pub fn page_base(&self) -> Self {
        VirtAddress::new(self.address & !(PAGE_SIZE - 1))
    }

    /// Returns the next page boundary address after this address.
    /// Example 4095 -> 4096
    /// Example 4096 -> 8192
    pub fn next_page_boundary(&self) -> Self {
        VirtAddress::new(self.address.wrapping_add(PAGE_SIZE) & !(PAGE_SIZE - 1))
    }

    pub fn align_down(&self, alignment: usize) -> Self {
        VirtAddress::new(self.address & !(alignment - 1))
    }

    pub fn is_word_aligned(&self) -> bool {
        self.address % WORD_SIZE == 0
    }
}

impl std::ops::Add<usize> for VirtAddress {
    type Output = VirtAddress;

    fn add(self, rhs: usize) -> Self::Output {
        VirtAddress::new(self.address.wrapping_add(rhs))
    }
}

impl std::ops::Sub<VirtAddress> for VirtAddress {
    type Output = usize;

    fn sub(self, rhs: VirtAddress) -> Self::Output {
        self.address.wrapping_sub(rhs.address)
    }
}

impl PartialOrd for VirtAddress {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VirtAddress {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.address.cmp(&other.address)
    }
}

impl Display for VirtAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.address)
    }
}

impl From<usize> for VirtAddress {
    fn from(address: usize) -> Self {
        VirtAddress::new(address)
    }
}

impl From<u64> for VirtAddress {
    fn from(address: u64) -> Self {
        VirtAddress::new(address as usize)
    }
}

impl From<VirtAddress> for usize {
    fn from(address: VirtAddress) -> usize {
        address.address
    }
}

/// An address split into the region it lives in and its byte offset there.
///
/// The viewer only ever builds these fresh from its own state; they are not
/// kept across redraws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorAddress {
    pub base: VirtAddress,
    pub offset: usize,
    pub region_size: usize,
}

impl CursorAddress {
    pub fn new(base: VirtAddress, offset: usize, region_size: usize) -> Self {
        CursorAddress {
            base,
            offset,
            region_size,
        }
    }

    /// A full word starting at `offset` still lies inside the region.
    pub fn valid(&self) -> bool {
        self.region_size >= WORD_SIZE && self.offset <= self.region_size - WORD_SIZE
    }

    pub fn address(&self) -> VirtAddress {
        self.base + self.offset
    }

    pub fn word_aligned(&self) -> CursorAddress {
        CursorAddress {
            offset: self.offset - self.offset % WORD_SIZE,
            ..*self
        }
    }

    /// Moves by `delta` bytes, returning `None` when that leaves the region.
    pub fn offs(&self, delta: isize) -> Option<CursorAddress> {
        let offset = self.offset.checked_add_signed(delta)?;
        let moved = CursorAddress { offset, ..*self };
        moved.valid().then_some(moved)
    }
}

impl Display for CursorAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{:03x}", self.base, self.offset)
    }
}
