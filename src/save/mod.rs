//! # Save Module
//! 
//! A single save is moved on and off a card as a `SaveFile`: the save directory's entry
//! plus its member files in slot order.  Container formats used by other tools
//! are handled by codecs implementing `SaveCodec`, and the `Registry` picks among them.
//! 
//! The card side is `fs::Card::export` and `fs::Card::import`.

pub mod cbs;
pub mod psu;

use std::str::FromStr;
use std::fmt;
use log::{debug,info,error};
use crate::fs::DirEntry;
use crate::fs::icon_sys::{IconSys,ICON_SYS_NAME};
use crate::{DYNERR,STDRESULT};

/// Enumerates save container errors.  The `Display` trait will print the long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("save file is corrupt")]
    CorruptData,
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    #[error("save file contains a subdirectory")]
    UnsupportedEntryKind,
    #[error("file index out of range")]
    IndexOutOfRange,
    #[error("unknown save file format")]
    UnknownFormat
}

/// One save directory and its files, detached from any card.
/// The directory entry's length is the number of member files.
#[derive(Clone,Debug,PartialEq)]
pub struct SaveFile {
    dir: DirEntry,
    files: Vec<(DirEntry,Vec<u8>)>
}

impl SaveFile {
    /// Empty save with a placeholder directory entry, expected to be replaced by `set_directory`.
    pub fn new() -> Self {
        Self {
            dir: DirEntry::new("",crate::fs::types::CANONICAL_DIR_MODE,0),
            files: Vec::new()
        }
    }
    pub fn set_directory(&mut self,ent: DirEntry) {
        self.dir = ent;
    }
    pub fn get_directory(&self) -> &DirEntry {
        &self.dir
    }
    /// Put a file at `index`, replacing the one already there, or appending if `index` is the current length.
    pub fn set_file(&mut self,index: usize,ent: DirEntry,dat: Vec<u8>) -> STDRESULT {
        if index < self.files.len() {
            self.files[index] = (ent,dat);
        } else if index==self.files.len() {
            self.files.push((ent,dat));
        } else {
            error!("file index {} with only {} files",index,self.files.len());
            return Err(Box::new(Error::IndexOutOfRange));
        }
        Ok(())
    }
    pub fn get_file(&self,index: usize) -> Option<&(DirEntry,Vec<u8>)> {
        self.files.get(index)
    }
    /// files in slot order
    pub fn files(&self) -> impl Iterator<Item = &(DirEntry,Vec<u8>)> {
        self.files.iter()
    }
    pub fn len(&self) -> usize {
        self.files.len()
    }
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
    /// sum of the member file lengths
    pub fn data_len(&self) -> usize {
        self.files.iter().map(|(_,dat)| dat.len()).sum()
    }
    /// The parsed `icon.sys` member, if there is one that parses.
    pub fn icon_sys(&self) -> Option<IconSys> {
        self.files.iter()
            .find(|(ent,_)| ent.name==ICON_SYS_NAME)
            .and_then(|(_,dat)| IconSys::from_bytes(dat).ok())
    }
}

/// Capability every container format provides.  Codecs are stateless.
pub trait SaveCodec {
    fn tag(&self) -> FormatTag;
    /// lower case file extensions, without the dot
    fn extensions(&self) -> &'static [&'static str];
    /// Cheap test of the first bytes of a file, no errors.
    fn sniff(&self,hdr: &[u8]) -> bool;
    /// Decode a whole container.  Fails on any structural problem.
    fn decode(&self,dat: &[u8]) -> Result<SaveFile,DYNERR>;
    fn encode(&self,save: &SaveFile) -> Result<Vec<u8>,DYNERR>;
}

/// The known container formats
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum FormatTag {
    /// CodeBreaker, RC4 and zlib around a flat list of records
    Cbs,
    /// EMS adapter, raw directory entries and data
    Psu
}

impl FormatTag {
    pub fn codec(&self) -> &'static dyn SaveCodec {
        match self {
            Self::Cbs => &cbs::CodeBreaker,
            Self::Psu => &psu::Psu
        }
    }
}

impl FromStr for FormatTag {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s {
            "cbs" => Ok(Self::Cbs),
            "psu" => Ok(Self::Psu),
            _ => Err(Error::UnknownFormat)
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cbs => write!(f,"cbs"),
            Self::Psu => write!(f,"psu")
        }
    }
}

/// Ordered list of codecs.  Detection tries them in order, so no two sniff predicates
/// may accept the same header.
pub struct Registry {
    order: Vec<FormatTag>,
    primary: FormatTag
}

impl Registry {
    pub fn new() -> Self {
        Self {
            order: vec![FormatTag::Cbs,FormatTag::Psu],
            primary: FormatTag::Psu
        }
    }
    pub fn formats(&self) -> &[FormatTag] {
        &self.order
    }
    pub fn primary(&self) -> FormatTag {
        self.primary
    }
    /// Identify a container from its leading bytes.
    pub fn detect(&self,hdr: &[u8]) -> Option<FormatTag> {
        for tag in &self.order {
            if tag.codec().sniff(hdr) {
                info!("identified {} save",tag);
                return Some(*tag);
            }
        }
        debug!("no format matches header");
        None
    }
    /// Choose a format from a file name's extension, falling back to the primary format.
    pub fn for_filename(&self,name: &str) -> FormatTag {
        let ext = match std::path::Path::new(name).extension() {
            Some(ext) => ext.to_string_lossy().to_lowercase(),
            None => return self.primary
        };
        for tag in &self.order {
            if tag.codec().extensions().contains(&ext.as_str()) {
                return *tag;
            }
        }
        debug!("extension {} not recognized, using {}",ext,self.primary);
        self.primary
    }
    pub fn encode(&self,tag: FormatTag,save: &SaveFile) -> Result<Vec<u8>,DYNERR> {
        tag.codec().encode(save)
    }
    pub fn decode(&self,tag: FormatTag,dat: &[u8]) -> Result<SaveFile,DYNERR> {
        tag.codec().decode(dat)
    }
}

/// Replace characters that cannot appear in host file names.
pub fn fix_filename(name: &str) -> String {
    match regex::Regex::new(r#"[\\/:*?"<>|]"#) {
        Ok(re) => re.replace_all(name,"_").to_string(),
        Err(_) => name.to_string()
    }
}

/// Descriptive host file name for a save: directory name, title, and CRC32 of the file data.
/// Product codes of the form `BASLUS-20001...` are shortened, and saves named `B?DATA...`
/// drop the title.
pub fn make_longname(dirname: &str,save: &SaveFile) -> String {
    let mut title = match save.icon_sys() {
        Some(icon) => icon.title_line(),
        None => String::new()
    };
    let mut hasher = crc32fast::Hasher::new();
    for (_,dat) in save.files() {
        hasher.update(dat);
    }
    let crc = hasher.finalize();
    let mut short = dirname;
    let prefix = dirname.get(0..2).unwrap_or("");
    if dirname.len() >= 12 && ["BA","BJ","BE","BK"].contains(&prefix) {
        match dirname.get(2..6) {
            Some("DATA") => title = String::new(),
            _ => short = dirname.get(2..12).unwrap_or(dirname)
        }
    }
    fix_filename(&format!("{} {} ({:08X})",short,title,crc))
}

#[cfg(test)]
pub fn test_save(dirname: &str,sizes: &[usize]) -> SaveFile {
    use crate::fs::types::DEFAULT_FILE_MODE;
    let mut ans = SaveFile::new();
    ans.set_directory(DirEntry::new(dirname,crate::fs::types::CANONICAL_DIR_MODE,sizes.len() as u32));
    for (i,sz) in sizes.iter().enumerate() {
        let dat: Vec<u8> = (0..*sz).map(|x| ((x*7+i) % 251) as u8).collect();
        ans.set_file(i,DirEntry::new(&format!("file{}",i),DEFAULT_FILE_MODE,*sz as u32),dat).expect("bad index");
    }
    ans
}

#[test]
fn set_file_bounds() {
    let mut save = test_save("SAVE",&[3,4]);
    assert_eq!(save.len(),2);
    assert_eq!(save.data_len(),7);
    let ent = save.get_file(0).expect("missing file").0.clone();
    save.set_file(0,ent.clone(),vec![1]).expect("bad index");
    assert_eq!(save.data_len(),5);
    match save.set_file(5,ent,vec![]) {
        Ok(_) => panic!("index should be out of range"),
        Err(e) => assert_eq!(e.to_string(),"file index out of range")
    }
}

#[test]
fn registry_dispatch() {
    let reg = Registry::new();
    assert_eq!(reg.for_filename("x/MYSAVE.CBS"),FormatTag::Cbs);
    assert_eq!(reg.for_filename("mysave.psu"),FormatTag::Psu);
    assert_eq!(reg.for_filename("mysave.bin"),FormatTag::Psu);
    assert_eq!(reg.for_filename("mysave"),FormatTag::Psu);
    assert_eq!(reg.detect(b"CFU\0abcd"),Some(FormatTag::Cbs));
    assert_eq!(reg.detect(b"nothing to see here"),None);
    let save = test_save("SAVE",&[100]);
    for tag in reg.formats() {
        let dat = reg.encode(*tag,&save).expect("encode failed");
        assert_eq!(reg.detect(&dat),Some(*tag));
        assert_eq!(tag.codec().tag(),*tag);
    }
    assert_eq!(FormatTag::from_str("cbs").expect("bad tag"),FormatTag::Cbs);
    assert!(FormatTag::from_str("max").is_err());
}

#[test]
fn long_names() {
    let mut save = test_save("BASLUS-20001SAVE",&[]);
    let icon = crate::fs::icon_sys::build("Hello","World","icon.ico");
    save.set_file(0,DirEntry::new(ICON_SYS_NAME,crate::fs::types::DEFAULT_FILE_MODE,icon.len() as u32),icon).expect("bad index");
    let name = make_longname("BASLUS-20001SAVE",&save);
    assert!(name.starts_with("SLUS-20001 Hello World ("));
    let name = make_longname("BADATA-SYSTEM",&save);
    assert!(name.starts_with("BADATA-SYSTEM  ("));
    assert_eq!(fix_filename("a:b?c"),"a_b_c");
}
