//! ### Directory entries
//! 
//! Every object on the card, including the `.` and `..` entries, is described by a
//! 512 byte directory entry.  A cluster holds two entries.  The raw layout is the
//! `DiskStruct` called `RawEntry`; the rest of the crate works with the decoded `DirEntry`.

use chrono::NaiveDateTime;
use log::warn;
use a2kit_macro::{DiskStruct,DiskStructError};
use a2kit_macro_derive::DiskStruct;
use super::types::*;
use super::tod;
use crate::DYNERR;

#[derive(DiskStruct)]
pub struct RawEntry {
    mode: [u8;2],
    unused: [u8;2],
    length: [u8;4],
    created: [u8;8],
    cluster: [u8;4],
    dir_entry: [u8;4],
    modified: [u8;8],
    attr: [u8;4],
    pad: [u8;28],
    name: [u8;32],
    pad2: [u8;416]
}

/// Decoded directory entry.
/// For a file `length` is the byte count, for a directory it is the count of entries,
/// including `.` and `..`.
#[derive(Clone,PartialEq,Eq,Debug)]
pub struct DirEntry {
    pub mode: u16,
    pub length: u32,
    pub created: NaiveDateTime,
    /// first cluster, relative to the allocatable area
    pub cluster: u32,
    /// in a `.` entry, slot of this directory within its parent
    pub dir_entry: u32,
    pub modified: NaiveDateTime,
    pub attr: u32,
    pub name: String
}

/// Decode a fixed width name, which ends at the first null, if any.
pub fn name_from_bytes(buf: &[u8]) -> String {
    let end = buf.iter().position(|x| *x==0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[0..end]).to_string()
}

/// Encode a name into a fixed width field, truncating if necessary.
pub fn name_to_bytes<const N: usize>(name: &str) -> [u8;N] {
    let mut ans = [0;N];
    let bytes = name.as_bytes();
    let actual = usize::min(bytes.len(),N);
    ans[0..actual].copy_from_slice(&bytes[0..actual]);
    ans
}

/// Names must fit the name field, and cannot contain a slash or be `.` or `..`.
pub fn is_name_valid(name: &str) -> bool {
    name.len() > 0 && name.len() <= NAME_LEN && !name.contains('/') && !name.contains('\0') && name!="." && name!=".."
}

impl DirEntry {
    /// New entry stamped with the current time, not yet placed on a card.
    pub fn new(name: &str,mode: u16,length: u32) -> Self {
        let now = tod::now();
        Self {
            mode,
            length,
            created: now,
            cluster: 0,
            dir_entry: 0,
            modified: now,
            attr: 0,
            name: name.to_string()
        }
    }
    /// Decode the 512 byte record.  Unset timestamps become the current time.
    pub fn from_bytes(buf: &[u8]) -> Result<Self,DYNERR> {
        let raw = RawEntry::from_bytes(&buf[0..usize::min(buf.len(),DIRENT_SIZE)])?;
        Ok(Self {
            mode: u16::from_le_bytes(raw.mode),
            length: u32::from_le_bytes(raw.length),
            created: tod::unpack_or_now(&raw.created),
            cluster: u32::from_le_bytes(raw.cluster),
            dir_entry: u32::from_le_bytes(raw.dir_entry),
            modified: tod::unpack_or_now(&raw.modified),
            attr: u32::from_le_bytes(raw.attr),
            name: name_from_bytes(&raw.name)
        })
    }
    /// Encode the 512 byte record.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = RawEntry::new();
        raw.mode = u16::to_le_bytes(self.mode);
        raw.length = u32::to_le_bytes(self.length);
        raw.created = tod::pack(&self.created);
        raw.cluster = u32::to_le_bytes(self.cluster);
        raw.dir_entry = u32::to_le_bytes(self.dir_entry);
        raw.modified = tod::pack(&self.modified);
        raw.attr = u32::to_le_bytes(self.attr);
        raw.name = name_to_bytes::<NAME_LEN>(&self.name);
        raw.to_bytes()
    }
    pub fn exists(&self) -> bool {
        self.mode & DF_EXISTS != 0
    }
    pub fn is_dir(&self) -> bool {
        mode_is_dir(self.mode)
    }
    pub fn is_file(&self) -> bool {
        mode_is_file(self.mode)
    }
    pub fn is_psx(&self) -> bool {
        mode_is_psx_dir(self.mode)
    }
    /// Replace a mode that does not describe a directory with the canonical one.
    pub fn coerce_dir_mode(&mut self) {
        if !self.is_dir() {
            warn!("mode {:#06x} of `{}` is not a directory, using {:#06x}",self.mode,self.name,CANONICAL_DIR_MODE);
            self.mode = CANONICAL_DIR_MODE;
        }
    }
    /// Clusters needed to hold the file data, or the entries if this is a directory.
    pub fn clusters_needed(&self,cluster_size: usize) -> usize {
        match self.is_dir() {
            true => (self.length as usize * DIRENT_SIZE).div_ceil(cluster_size),
            false => (self.length as usize).div_ceil(cluster_size)
        }
    }
    /// Short string for the mode, in the spirit of a unix listing
    pub fn mode_string(&self) -> String {
        let flag = |bit: u16,c: char| match self.mode & bit {
            0 => '-',
            _ => c
        };
        let kind = match (self.is_dir(),self.is_psx()) {
            (true,true) => 'p',
            (true,false) => 'd',
            _ => '-'
        };
        [kind,flag(DF_READ,'r'),flag(DF_WRITE,'w'),flag(DF_EXECUTE,'x'),flag(DF_PROTECTED,'p'),flag(DF_HIDDEN,'h')].iter().collect()
    }
}

/// The `.` and `..` entries that begin every directory.
/// `parent_cluster` and `slot` locate this directory's own entry in its parent.
pub fn dot_entries(parent_cluster: u32,slot: u32,length: u32,time: &NaiveDateTime) -> [DirEntry;2] {
    let dot = DirEntry {
        mode: CANONICAL_DIR_MODE,
        length,
        created: *time,
        cluster: parent_cluster,
        dir_entry: slot,
        modified: *time,
        attr: 0,
        name: ".".to_string()
    };
    let dotdot = DirEntry {
        mode: PARENT_DIR_MODE,
        length: 0,
        created: *time,
        cluster: 0,
        dir_entry: 0,
        modified: *time,
        attr: 0,
        name: "..".to_string()
    };
    [dot,dotdot]
}

#[test]
fn entry_round_trip() {
    let mut ent = DirEntry::new("BASLUS-20001SAVE",CANONICAL_DIR_MODE,5);
    ent.cluster = 12;
    let buf = ent.to_bytes();
    assert_eq!(buf.len(),DIRENT_SIZE);
    assert_eq!(&buf[0..2],&[0x27,0x84]);
    assert_eq!(&buf[0x40..0x50],b"BASLUS-20001SAVE");
    let copy = DirEntry::from_bytes(&buf).expect("bad entry");
    assert_eq!(copy,ent);
    assert_eq!(copy.mode_string(),"drwx--");
}

#[test]
fn names() {
    assert!(is_name_valid("icon.sys"));
    assert!(!is_name_valid(".."));
    assert!(!is_name_valid("a/b"));
    assert!(!is_name_valid(&"x".repeat(33)));
    assert_eq!(name_from_bytes(b"abc\0def"),"abc");
    assert_eq!(name_to_bytes::<4>("abcdef"),*b"abcd");
}
