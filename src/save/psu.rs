//! ### EMS saves
//! 
//! The `.psu` format written by the EMS memory adapter is a save directory dumped as it
//! would sit on a card: the directory entry, the `.` and `..` entries, then each file's entry
//! followed by its data padded to a whole cluster.  There is no compression.

use log::error;
use super::{Error,FormatTag,SaveCodec,SaveFile};
use crate::fs::DirEntry;
use crate::fs::directory::dot_entries;
use crate::fs::types::DIRENT_SIZE;
use crate::img::names::CLUSTER_SIZE;
use crate::DYNERR;

pub struct Psu;

fn entry_at(dat: &[u8],offset: usize) -> Result<DirEntry,DYNERR> {
    if dat.len() < offset + DIRENT_SIZE {
        error!("entry at {} is past end of file",offset);
        return Err(Box::new(Error::UnexpectedEndOfInput));
    }
    DirEntry::from_bytes(&dat[offset..offset+DIRENT_SIZE])
}

impl SaveCodec for Psu {
    fn tag(&self) -> FormatTag {
        FormatTag::Psu
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["psu"]
    }
    fn sniff(&self,hdr: &[u8]) -> bool {
        if hdr.len() < 3*DIRENT_SIZE {
            return false;
        }
        let ents: Vec<DirEntry> = (0..3).filter_map(|i| entry_at(hdr,i*DIRENT_SIZE).ok()).collect();
        ents.len()==3 && ents.iter().all(|e| e.is_dir()) && ents[1].name=="." && ents[2].name==".."
    }
    fn decode(&self,dat: &[u8]) -> Result<SaveFile,DYNERR> {
        let mut dir = entry_at(dat,0)?;
        if !dir.is_dir() || dir.length < 2 {
            error!("not an EMS save");
            return Err(Box::new(Error::CorruptData));
        }
        let count = dir.length as usize - 2;
        let mut offset = 3*DIRENT_SIZE;
        let mut save = SaveFile::new();
        for i in 0..count {
            let mut ent = entry_at(dat,offset)?;
            offset += DIRENT_SIZE;
            if !ent.is_file() {
                error!("`{}` is not a file",ent.name);
                return Err(Box::new(Error::UnsupportedEntryKind));
            }
            let len = ent.length as usize;
            if dat.len() < offset + len {
                error!("`{}` needs {} bytes, {} remain",ent.name,len,dat.len()-offset);
                return Err(Box::new(Error::UnexpectedEndOfInput));
            }
            let file_dat = dat[offset..offset+len].to_vec();
            offset += len.div_ceil(CLUSTER_SIZE) * CLUSTER_SIZE;
            ent.cluster = 0;
            ent.dir_entry = 0;
            save.set_file(i,ent,file_dat)?;
        }
        dir.length = count as u32;
        dir.cluster = 0;
        dir.dir_entry = 0;
        save.set_directory(dir);
        Ok(save)
    }
    fn encode(&self,save: &SaveFile) -> Result<Vec<u8>,DYNERR> {
        let mut dir = save.get_directory().clone();
        dir.length = save.len() as u32 + 2;
        dir.cluster = 0;
        dir.dir_entry = 0;
        let mut ans = dir.to_bytes();
        for mut ent in dot_entries(0,0,0,&dir.created) {
            ent.mode = crate::fs::types::CANONICAL_DIR_MODE;
            ent.modified = dir.modified;
            ans.append(&mut ent.to_bytes());
        }
        for (ent,dat) in save.files() {
            let mut ent = ent.clone();
            ent.length = dat.len() as u32;
            ent.cluster = 0;
            ent.dir_entry = 0;
            ans.append(&mut ent.to_bytes());
            ans.extend_from_slice(dat);
            ans.resize(ans.len() + dat.len().next_multiple_of(CLUSTER_SIZE) - dat.len(),0);
        }
        Ok(ans)
    }
}

#[cfg(test)]
use super::test_save;

#[test]
fn round_trip() {
    let save = test_save("BESCES-50000SAVE",&[0,1024,1500]);
    let dat = Psu.encode(&save).expect("encode failed");
    assert_eq!(dat.len(),6*DIRENT_SIZE + 1024 + 2048);
    assert!(Psu.sniff(&dat));
    assert_eq!(Psu.decode(&dat).expect("decode failed"),save);
}

#[test]
fn truncated() {
    let save = test_save("SAVE",&[3000]);
    let dat = Psu.encode(&save).expect("encode failed");
    match Psu.decode(&dat[0..dat.len()-2000]) {
        Ok(_) => panic!("truncated save decoded"),
        Err(e) => assert_eq!(e.to_string(),"unexpected end of input")
    }
    assert!(!Psu.sniff(&dat[0..1000]));
}
