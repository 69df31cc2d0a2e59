//! ## Card Names
//! 
//! Handy constants for the memory cards that were actually manufactured.
//! Every official card uses the same page layout, larger third party cards
//! simply multiply the number of pages.

/// bytes of data in a page, not counting the spare area
pub const PAGE_SIZE: usize = 512;
pub const PAGES_PER_ERASE_BLOCK: usize = 16;
/// pages on a standard 8 MB card
pub const PAGES_PER_CARD: usize = 16384;
/// clusters are always this size, the pages per cluster follows from the page size
pub const CLUSTER_SIZE: usize = 1024;
/// span of data protected by one 3 byte ECC code
pub const ECC_CHUNK: usize = 128;
/// bytes of the spare area allotted to each ECC chunk (3 used, 1 padding)
pub const ECC_SPARE_PER_CHUNK: usize = 4;
/// multipliers of the standard page count, 8, 16, 32, and 64 MB
pub const SIZE_MULTIPLIERS: [usize;4] = [1,2,4,8];

pub const CARD_8M: usize = 1;
pub const CARD_16M: usize = 2;
pub const CARD_32M: usize = 4;
pub const CARD_64M: usize = 8;
