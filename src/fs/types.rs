/// Enumerates memory card file system errors.  The `Display` trait will print the long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("not a PS2 memory card")]
    NotFormatted,
    #[error("card geometry does not match superblock")]
    GeometryMismatch,
    #[error("corrupt data")]
    CorruptData,
    #[error("file allocation table bad")]
    BadFAT,
    #[error("directory already exists")]
    NameCollision,
    #[error("file not found")]
    FileNotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("unsupported entry kind")]
    UnsupportedEntryKind,
    #[error("insufficient space on card")]
    DiskFull,
    #[error("syntax")]
    Syntax,
    #[error("invalid name")]
    InvalidName
}

pub const MAGIC: &[u8;28] = b"Sony PS2 Memory Card Format ";
pub const VERSION: &[u8;12] = b"1.2.0.0\0\0\0\0\0";
pub const CARD_TYPE_PS2: u8 = 2;
/// flags written by official cards
pub const CARD_FLAGS: u8 = 0x52;
pub const CF_ECC: u8 = 0x01;
pub const CF_BAD_ERASE_BLOCK: u8 = 0x08;
pub const CF_ERASE_ZEROES: u8 = 0x10;
/// first cluster of the indirect FAT cluster list on a freshly formatted card
pub const FIRST_INDIRECT_CLUSTER: usize = 8;
pub const MAX_INDIRECT_CLUSTERS: usize = 32;

pub const DIRENT_SIZE: usize = 512;
pub const NAME_LEN: usize = 32;

/// FAT entry flag marking a cluster in use
pub const ALLOCATED: u32 = 0x8000_0000;
/// FAT entry of a free cluster
pub const FREE_CLUSTER: u32 = 0x7fff_ffff;
/// FAT entry of the last cluster of a chain
pub const CHAIN_END: u32 = 0xffff_ffff;
/// first-cluster value of a file that owns no clusters
pub const NO_CLUSTER: u32 = 0xffff_ffff;

// mode bits
pub const DF_READ: u16 = 0x0001;
pub const DF_WRITE: u16 = 0x0002;
pub const DF_EXECUTE: u16 = 0x0004;
pub const DF_RWX: u16 = DF_READ | DF_WRITE | DF_EXECUTE;
pub const DF_PROTECTED: u16 = 0x0008;
pub const DF_FILE: u16 = 0x0010;
pub const DF_DIR: u16 = 0x0020;
pub const DF_O_DCREAT: u16 = 0x0040;
pub const DF_O_CREAT: u16 = 0x0080;
pub const DF_O_EXCL: u16 = 0x0100;
pub const DF_0400: u16 = 0x0400;
pub const DF_POCKETSTN: u16 = 0x0800;
pub const DF_PSX: u16 = 0x1000;
pub const DF_HIDDEN: u16 = 0x2000;
pub const DF_EXISTS: u16 = 0x8000;

/// mode a save directory is given when the stored mode is not a directory
pub const CANONICAL_DIR_MODE: u16 = DF_RWX | DF_DIR | DF_0400 | DF_EXISTS;
/// mode of the `..` entry
pub const PARENT_DIR_MODE: u16 = DF_WRITE | DF_EXECUTE | DF_DIR | DF_0400 | DF_HIDDEN | DF_EXISTS;
/// mode of a typical save file
pub const DEFAULT_FILE_MODE: u16 = DF_RWX | DF_FILE | DF_O_CREAT | DF_0400 | DF_EXISTS;

pub fn mode_is_dir(mode: u16) -> bool {
    mode & (DF_DIR | DF_FILE | DF_EXISTS) == DF_DIR | DF_EXISTS
}

pub fn mode_is_file(mode: u16) -> bool {
    mode & (DF_DIR | DF_FILE | DF_EXISTS) == DF_FILE | DF_EXISTS
}

/// directory written by a PS1 game (via the PS2's PS1 emulation)
pub fn mode_is_psx_dir(mode: u16) -> bool {
    mode_is_dir(mode) && mode & DF_PSX != 0
}

#[test]
fn mode_tests() {
    assert!(mode_is_dir(CANONICAL_DIR_MODE));
    assert!(mode_is_dir(PARENT_DIR_MODE));
    assert!(!mode_is_dir(DF_DIR | DF_RWX));
    assert!(!mode_is_dir(DF_DIR | DF_FILE | DF_EXISTS));
    assert!(mode_is_file(DEFAULT_FILE_MODE));
    assert!(!mode_is_file(CANONICAL_DIR_MODE));
    assert_eq!(CANONICAL_DIR_MODE,0x8427);
    assert_eq!(PARENT_DIR_MODE,0xa426);
    assert_eq!(DEFAULT_FILE_MODE,0x8497);
}
