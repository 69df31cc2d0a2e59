//! # File System Module
//! 
//! The memory card file system is a FAT file system with a twist: the FAT is located
//! through an indirect list in the superblock, and cluster numbers are relative to the
//! start of the allocatable area.  The `Card` object owns a `CardImage` and interprets it.
//! 
//! ## Structure
//! 
//! The root directory holds one entry per save, each save is a directory holding
//! plain files.  Nested directories are not used by the console and are not supported here.
//! Paths are written `/SAVE` or `/SAVE/file`.
//! 
//! ## Buffering
//! 
//! The FAT is buffered in its entirety when the card is opened.  Operations that change
//! the FAT write it back before returning, so the image is always consistent between calls.
//! The in-memory image is not permanent until the caller saves it.
//! 
//! ## Saves
//! 
//! A save directory is exchanged with the container codecs as a `save::SaveFile`,
//! see `export` and `import`.

pub mod types;
pub mod tod;
pub mod fat;
pub mod directory;
pub mod superblock;
pub mod icon_sys;

use std::fmt;
use std::io::Cursor;
use bit_vec::BitVec;
use log::{trace,debug,info,warn,error};
use a2kit_macro::DiskStruct;
use types::*;
pub use directory::DirEntry;
use superblock::Superblock;
use icon_sys::IconSys;
use crate::img::{CardImage,geometry::Geometry};
use crate::save::SaveFile;
use crate::{DYNERR,STDRESULT};

pub use types::Error;

/// bytes of page 0 taken by the superblock
const SUPERBLOCK_LEN: usize = 340;

fn u32_list(buf: &[u8]) -> Vec<u32> {
    buf.chunks_exact(4).map(|x| u32::from_le_bytes([x[0],x[1],x[2],x[3]])).collect()
}

/// Outcome of a consistency check, listing every repair that was made.
#[derive(Debug,Default)]
pub struct CheckReport {
    pub repairs: Vec<String>,
    pub lost_clusters: usize
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.repairs.len()==0 && self.lost_clusters==0
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f,"no problems found");
        }
        for r in &self.repairs {
            writeln!(f,"{}",r)?;
        }
        write!(f,"freed {} lost clusters",self.lost_clusters)
    }
}

/// Lazy listing of a directory in slot order.  Slots whose entries do not exist are skipped.
/// Use `rewind` to start over.
pub struct Listing<'a> {
    card: &'a Card,
    chain: Vec<usize>,
    len: usize,
    idx: usize,
    buf: Option<(usize,Vec<u8>)>
}

impl<'a> Listing<'a> {
    pub fn rewind(&mut self) {
        self.idx = 0;
    }
    fn get(&mut self,slot: usize) -> Result<DirEntry,DYNERR> {
        let epc = self.card.entries_per_cluster();
        let which = slot / epc;
        if which >= self.chain.len() {
            error!("directory chain is shorter than its length");
            return Err(Box::new(Error::CorruptData));
        }
        let cached = match &self.buf {
            Some((c,_)) => *c==which,
            None => false
        };
        if !cached {
            self.buf = Some((which,self.card.read_rel_cluster(self.chain[which])?));
        }
        match &self.buf {
            Some((_,buf)) => {
                let offset = (slot % epc) * DIRENT_SIZE;
                DirEntry::from_bytes(&buf[offset..offset+DIRENT_SIZE])
            },
            None => Err(Box::new(Error::CorruptData))
        }
    }
}

impl<'a> Iterator for Listing<'a> {
    type Item = Result<DirEntry,DYNERR>;
    fn next(&mut self) -> Option<Self::Item> {
        while self.idx < self.len {
            let slot = self.idx;
            self.idx += 1;
            match self.get(slot) {
                Ok(ent) if ent.exists() => return Some(Ok(ent)),
                Ok(_) => continue,
                Err(e) => {
                    self.idx = self.len;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// The primary interface for card operations.
pub struct Card {
    img: CardImage,
    sb: Superblock,
    /// absolute clusters holding the FAT
    fat_clusters: Vec<usize>,
    fat: Vec<u32>
}

impl Card {
    /// Interpret an image as a memory card file system.  The card takes ownership of the image.
    /// Fails if the superblock is missing or disagrees with the image geometry.
    pub fn open(img: CardImage) -> Result<Self,DYNERR> {
        let geom = img.geometry();
        let page0 = img.read_page(0)?;
        let sb = Superblock::from_bytes(&page0[0..SUPERBLOCK_LEN])?;
        sb.verify(&geom)?;
        let (fat_count,indirect_count) = superblock::fat_cluster_counts(&geom);
        let alloc_offset = sb.alloc_offset() as usize;
        let mut fat_clusters = Vec::new();
        for ic in sb.indirect_clusters(indirect_count) {
            if ic as usize >= alloc_offset {
                error!("indirect FAT cluster {} is in the allocatable area",ic);
                return Err(Box::new(Error::CorruptData));
            }
            for c in u32_list(&img.read_cluster(ic as usize)?) {
                if fat_clusters.len() < fat_count {
                    if c as usize >= alloc_offset {
                        error!("FAT cluster {} is in the allocatable area",c);
                        return Err(Box::new(Error::CorruptData));
                    }
                    fat_clusters.push(c as usize);
                }
            }
        }
        let mut fat = Vec::new();
        for c in &fat_clusters {
            fat.append(&mut u32_list(&img.read_cluster(*c)?));
        }
        if fat.len() < sb.alloc_end() as usize {
            error!("FAT does not cover the allocatable area");
            return Err(Box::new(Error::BadFAT));
        }
        let card = Self {
            img,
            sb,
            fat_clusters,
            fat
        };
        let root = card.root_dot()?;
        if !root.is_dir() {
            error!("root directory entry is not a directory");
            return Err(Box::new(Error::CorruptData));
        }
        info!("opened {}",geom);
        Ok(card)
    }
    /// Create a blank card: superblock, FAT, and an empty root directory.
    pub fn format(geom: Geometry) -> Result<Self,DYNERR> {
        let sb = Superblock::create(&geom)?;
        let mut img = CardImage::blank(geom);
        let (fat_count,indirect_count) = superblock::fat_cluster_counts(&geom);
        let epc = geom.cluster_size() / 4;
        let first_fat = FIRST_INDIRECT_CLUSTER + indirect_count;
        let fat_clusters: Vec<usize> = (first_fat..first_fat+fat_count).collect();
        for i in 0..indirect_count {
            let mut buf = vec![0;geom.cluster_size()];
            let end = usize::min((i+1)*epc,fat_count);
            for (j,c) in fat_clusters[i*epc..end].iter().enumerate() {
                buf[j*4..j*4+4].copy_from_slice(&u32::to_le_bytes(*c as u32));
            }
            img.write_cluster(FIRST_INDIRECT_CLUSTER+i,&buf)?;
        }
        let mut page0 = vec![0xff;geom.page_size()];
        page0[0..SUPERBLOCK_LEN].copy_from_slice(&sb.to_bytes());
        img.write_page(0,&page0)?;
        let mut card = Self {
            img,
            sb,
            fat_clusters,
            fat: vec![FREE_CLUSTER;fat_count*epc]
        };
        let root = card.sb.rootdir_cluster() as usize;
        fat::mark_last(root,&mut card.fat);
        let now = tod::now();
        let dots = directory::dot_entries(0,0,2,&now);
        card.write_rel_cluster(root,&[dots[0].to_bytes(),dots[1].to_bytes()].concat())?;
        card.writeback_fat()?;
        info!("formatted {}",geom);
        Ok(card)
    }
    /// Release the card, returning the image with all buffers written back.
    pub fn close(mut self) -> Result<CardImage,DYNERR> {
        self.writeback_fat()?;
        Ok(self.img)
    }
    /// Underlying image, buffers are written back first.
    pub fn get_img(&mut self) -> Result<&mut CardImage,DYNERR> {
        self.writeback_fat()?;
        Ok(&mut self.img)
    }
    pub fn to_bytes(&mut self) -> Result<Vec<u8>,DYNERR> {
        self.writeback_fat()?;
        Ok(self.img.to_bytes())
    }
    pub fn geometry(&self) -> Geometry {
        self.img.geometry()
    }
    /// Superblock as JSON
    pub fn stat(&self,indent: Option<u16>) -> String {
        self.sb.to_json(indent)
    }
    fn writeback_fat(&mut self) -> STDRESULT {
        let epc = self.geometry().cluster_size() / 4;
        for (i,c) in self.fat_clusters.iter().enumerate() {
            let buf: Vec<u8> = self.fat[i*epc..(i+1)*epc].iter().flat_map(|x| u32::to_le_bytes(*x)).collect();
            self.img.write_cluster(*c,&buf)?;
        }
        trace!("FAT written back");
        Ok(())
    }
    fn alloc_end(&self) -> usize {
        self.sb.alloc_end() as usize
    }
    fn cluster_size(&self) -> usize {
        self.geometry().cluster_size()
    }
    fn entries_per_cluster(&self) -> usize {
        self.cluster_size() / DIRENT_SIZE
    }
    fn read_rel_cluster(&self,n: usize) -> Result<Vec<u8>,DYNERR> {
        self.img.read_cluster(n + self.sb.alloc_offset() as usize)
    }
    fn write_rel_cluster(&mut self,n: usize,dat: &[u8]) -> STDRESULT {
        self.img.write_cluster(n + self.sb.alloc_offset() as usize,dat)
    }
    fn chain(&self,first: u32) -> Result<Vec<usize>,DYNERR> {
        fat::chain(first as usize,&self.fat,self.alloc_end())
    }
    /// `.` entry of the root directory, its length is the root entry count
    fn root_dot(&self) -> Result<DirEntry,DYNERR> {
        let buf = self.read_rel_cluster(self.sb.rootdir_cluster() as usize)?;
        DirEntry::from_bytes(&buf[0..DIRENT_SIZE])
    }
    /// Read `len` entries of a directory, including deleted slots.
    fn read_dir(&self,chain: &[usize],len: usize) -> Result<Vec<DirEntry>,DYNERR> {
        let epc = self.entries_per_cluster();
        if chain.len() * epc < len {
            error!("directory of {} entries has only {} clusters",len,chain.len());
            return Err(Box::new(Error::CorruptData));
        }
        let mut ans = Vec::new();
        for c in chain {
            let buf = self.read_rel_cluster(*c)?;
            for i in 0..epc {
                if ans.len() < len {
                    ans.push(DirEntry::from_bytes(&buf[i*DIRENT_SIZE..(i+1)*DIRENT_SIZE])?);
                }
            }
        }
        Ok(ans)
    }
    fn write_dir_entry(&mut self,chain: &[usize],slot: usize,ent: &DirEntry) -> STDRESULT {
        let epc = self.entries_per_cluster();
        let c = chain[slot / epc];
        let mut buf = self.read_rel_cluster(c)?;
        let offset = (slot % epc) * DIRENT_SIZE;
        buf[offset..offset+DIRENT_SIZE].copy_from_slice(&ent.to_bytes());
        self.write_rel_cluster(c,&buf)
    }
    /// root directory's cluster chain and all of its slots
    fn root(&self) -> Result<(Vec<usize>,Vec<DirEntry>),DYNERR> {
        let dot = self.root_dot()?;
        let chain = self.chain(self.sb.rootdir_cluster())?;
        let entries = self.read_dir(&chain,dot.length as usize)?;
        Ok((chain,entries))
    }
    /// Put path as [save] or [save,file], or [] for the root.
    /// Leading and trailing slashes are optional.
    fn normalize_path(&self,path: &str) -> Result<Vec<String>,DYNERR> {
        let nodes: Vec<String> = path.split('/').filter(|s| s.len()>0).map(|s| s.to_string()).collect();
        if nodes.len() > 2 {
            error!("nested directories are not supported: {}",path);
            return Err(Box::new(Error::Syntax));
        }
        Ok(nodes)
    }
    /// find an existing entry by name, returns slot and entry
    fn find(entries: &[DirEntry],name: &str) -> Option<(usize,DirEntry)> {
        for (slot,ent) in entries.iter().enumerate().skip(2) {
            if ent.exists() && ent.name==name {
                return Some((slot,ent.clone()));
            }
        }
        None
    }
    /// root slot and entry of a save directory
    fn find_save(&self,name: &str) -> Result<(usize,DirEntry),DYNERR> {
        let (_chain,entries) = self.root()?;
        match Self::find(&entries,name) {
            Some((slot,ent)) if ent.is_dir() => Ok((slot,ent)),
            Some(_) => {
                error!("{} is not a directory",name);
                Err(Box::new(Error::NotADirectory))
            },
            None => Err(Box::new(Error::FileNotFound))
        }
    }
    /// all slots of a save directory
    fn save_entries(&self,save: &DirEntry) -> Result<Vec<DirEntry>,DYNERR> {
        let chain = self.chain(save.cluster)?;
        self.read_dir(&chain,save.length as usize)
    }
    /// existing member files of a save directory, failing on anything that is not a file
    fn member_files(&self,save: &DirEntry) -> Result<Vec<DirEntry>,DYNERR> {
        let mut ans = Vec::new();
        for ent in self.save_entries(save)?.into_iter().skip(2) {
            if !ent.exists() {
                continue;
            }
            if !ent.is_file() {
                error!("{} in {} is not a file",ent.name,save.name);
                return Err(Box::new(Error::UnsupportedEntryKind));
            }
            ans.push(ent);
        }
        Ok(ans)
    }
    fn read_file_data(&self,ent: &DirEntry) -> Result<Vec<u8>,DYNERR> {
        let len = ent.length as usize;
        if len==0 {
            return Ok(Vec::new());
        }
        let chain = self.chain(ent.cluster)?;
        if chain.len() * self.cluster_size() < len {
            error!("{} is longer than its cluster chain",ent.name);
            return Err(Box::new(Error::CorruptData));
        }
        let mut ans = Vec::with_capacity(len);
        for c in chain {
            if ans.len() >= len {
                break;
            }
            ans.append(&mut self.read_rel_cluster(c)?);
        }
        ans.truncate(len);
        Ok(ans)
    }
    /// List a directory lazily, in slot order.  Path is `/` for the root or `/SAVE`.
    pub fn list(&self,path: &str) -> Result<Listing<'_>,DYNERR> {
        let nodes = self.normalize_path(path)?;
        let (chain,len) = match nodes.len() {
            0 => (self.chain(self.sb.rootdir_cluster())?,self.root_dot()?.length as usize),
            1 => {
                let (_slot,save) = self.find_save(&nodes[0])?;
                (self.chain(save.cluster)?,save.length as usize)
            },
            _ => {
                error!("{} is not a directory",path);
                return Err(Box::new(Error::NotADirectory));
            }
        };
        debug!("listing {} entries of {}",len,path);
        Ok(Listing {
            card: self,
            chain,
            len,
            idx: 0,
            buf: None
        })
    }
    /// Save directories on the card, in slot order.
    pub fn saves(&self) -> Result<Vec<DirEntry>,DYNERR> {
        let mut ans = Vec::new();
        for ent in self.list("/")? {
            let ent = ent?;
            if ent.is_dir() && ent.name!="." && ent.name!=".." {
                ans.push(ent);
            }
        }
        Ok(ans)
    }
    /// Directory entry for a save or a member file.
    pub fn entry(&self,path: &str) -> Result<DirEntry,DYNERR> {
        let nodes = self.normalize_path(path)?;
        match nodes.len() {
            0 => self.root_dot(),
            1 => Ok(self.find_save(&nodes[0])?.1),
            _ => {
                let (_slot,save) = self.find_save(&nodes[0])?;
                match Self::find(&self.save_entries(&save)?,&nodes[1]) {
                    Some((_slot,ent)) => Ok(ent),
                    None => Err(Box::new(Error::FileNotFound))
                }
            }
        }
    }
    /// Sum of member file lengths of a save, or the length of a single file.
    pub fn entry_size(&self,path: &str) -> Result<usize,DYNERR> {
        let ent = self.entry(path)?;
        if ent.is_file() {
            return Ok(ent.length as usize);
        }
        Ok(self.member_files(&ent)?.iter().map(|x| x.length as usize).sum())
    }
    /// Space a save occupies on the card: its directory clusters plus the clusters of every member.
    pub fn entry_footprint(&self,path: &str) -> Result<usize,DYNERR> {
        let ent = self.entry(path)?;
        let cs = self.cluster_size();
        if ent.is_file() {
            return Ok(ent.clusters_needed(cs) * cs);
        }
        let mut ans = ent.clusters_needed(cs) * cs;
        for f in self.member_files(&ent)? {
            ans += f.clusters_needed(cs) * cs;
        }
        Ok(ans)
    }
    /// Parsed `icon.sys` of a save, None if it is missing or malformed (e.g. PS1 saves).
    pub fn read_icon_metadata(&self,path: &str) -> Result<Option<IconSys>,DYNERR> {
        let (_slot,save) = self.find_save(path.trim_matches('/'))?;
        let ent = match Self::find(&self.save_entries(&save)?,icon_sys::ICON_SYS_NAME) {
            Some((_slot,ent)) if ent.is_file() => ent,
            _ => return Ok(None)
        };
        match IconSys::from_bytes(&self.read_file_data(&ent)?) {
            Ok(icon) => Ok(Some(icon)),
            Err(e) => {
                warn!("icon.sys in {} could not be parsed: {}",save.name,e);
                Ok(None)
            }
        }
    }
    /// Open a member file of a save for reading.
    pub fn open_member(&self,path: &str,name: &str) -> Result<Cursor<Vec<u8>>,DYNERR> {
        let (_slot,save) = self.find_save(path.trim_matches('/'))?;
        match Self::find(&self.save_entries(&save)?,name) {
            Some((_slot,ent)) if ent.is_file() => Ok(Cursor::new(self.read_file_data(&ent)?)),
            Some(_) => Err(Box::new(Error::UnsupportedEntryKind)),
            None => Err(Box::new(Error::FileNotFound))
        }
    }
    /// Copy a save directory and its files into a `SaveFile`.  The card is not changed.
    pub fn export(&self,path: &str) -> Result<SaveFile,DYNERR> {
        let (_slot,save) = self.find_save(path.trim_matches('/'))?;
        let mut sf = SaveFile::new();
        for (i,mut ent) in self.member_files(&save)?.into_iter().enumerate() {
            let dat = self.read_file_data(&ent)?;
            ent.cluster = 0;
            ent.dir_entry = 0;
            sf.set_file(i,ent,dat)?;
        }
        let mut dir = save.clone();
        dir.length = sf.len() as u32;
        dir.cluster = 0;
        dir.dir_entry = 0;
        sf.set_directory(dir);
        debug!("exported {} with {} files",save.name,sf.len());
        Ok(sf)
    }
    /// clusters owned by a save, its own and those of its members
    fn owned_clusters(&self,save: &DirEntry) -> Result<Vec<usize>,DYNERR> {
        let mut ans = self.chain(save.cluster)?;
        for f in self.member_files(save)? {
            if f.length > 0 {
                ans.append(&mut self.chain(f.cluster)?);
            }
        }
        Ok(ans)
    }
    /// Write a `SaveFile` to the card as a new save directory.
    /// If a save with the same name exists this fails with `NameCollision`, unless `overwrite`
    /// is set, in which case the old save is replaced.  All checks, including free space,
    /// happen before anything is written, and the FAT is restored if a write fails.
    pub fn import(&mut self,sf: &SaveFile,overwrite: bool) -> STDRESULT {
        let mut dir = sf.get_directory().clone();
        if !directory::is_name_valid(&dir.name) {
            error!("invalid save name `{}`",dir.name);
            return Err(Box::new(Error::InvalidName));
        }
        dir.coerce_dir_mode();
        let mut names = Vec::new();
        for (ent,_dat) in sf.files() {
            if !directory::is_name_valid(&ent.name) {
                error!("invalid file name `{}`",ent.name);
                return Err(Box::new(Error::InvalidName));
            }
            if !ent.is_file() {
                error!("{} is not a file",ent.name);
                return Err(Box::new(Error::UnsupportedEntryKind));
            }
            if names.contains(&ent.name) {
                error!("file `{}` appears twice",ent.name);
                return Err(Box::new(Error::NameCollision));
            }
            names.push(ent.name.clone());
        }
        let (root_chain,root_entries) = self.root()?;
        let existing = Self::find(&root_entries,&dir.name);
        if let Some((_,old)) = &existing {
            if !overwrite {
                error!("{} already exists",dir.name);
                return Err(Box::new(Error::NameCollision));
            }
            if !old.is_dir() {
                error!("{} exists and is not a directory",dir.name);
                return Err(Box::new(Error::UnsupportedEntryKind));
            }
        }
        // work out the slot and space before touching anything
        let cs = self.cluster_size();
        let epc = self.entries_per_cluster();
        let slot = match &existing {
            Some((slot,_)) => *slot,
            None => match root_entries.iter().enumerate().skip(2).find(|(_,e)| !e.exists()) {
                Some((slot,_)) => slot,
                None => root_entries.len()
            }
        };
        let grow_root = slot==root_entries.len() && slot % epc == 0;
        let dir_clusters = (sf.len() + 2).div_ceil(epc);
        let file_clusters: usize = sf.files().map(|(_,dat)| dat.len().div_ceil(cs)).sum();
        let needed = dir_clusters + file_clusters + grow_root as usize;
        let old_clusters = match &existing {
            Some((_,old)) => self.owned_clusters(old)?,
            None => Vec::new()
        };
        let free = fat::free_count(&self.fat,self.alloc_end());
        if needed > free + old_clusters.len() {
            error!("save needs {} clusters, {} available",needed,free + old_clusters.len());
            return Err(Box::new(Error::DiskFull));
        }
        let snapshot = self.fat.clone();
        let result = self.import_unchecked(sf,dir,slot,root_chain,root_entries.len(),&old_clusters,needed > free);
        if result.is_err() {
            warn!("import failed, restoring FAT");
            self.fat = snapshot;
        }
        result
    }
    /// Second half of `import`, assumes all checks have passed.
    /// The root slot is written last, up to that point only free clusters have been written.
    fn import_unchecked(&mut self,sf: &SaveFile,mut dir: DirEntry,slot: usize,mut root_chain: Vec<usize>,root_len: usize,
        old_clusters: &[usize],free_old_first: bool) -> STDRESULT {
        let cs = self.cluster_size();
        let epc = self.entries_per_cluster();
        let end = self.alloc_end();
        if free_old_first {
            debug!("reclaiming {} clusters of replaced save first",old_clusters.len());
            for c in old_clusters {
                fat::deallocate(*c,&mut self.fat);
            }
        }
        let dir_chain = fat::allocate((sf.len() + 2).div_ceil(epc),&mut self.fat,end)?;
        let root_cluster = self.sb.rootdir_cluster();
        let mut dir_buf = Vec::new();
        for ent in directory::dot_entries(root_cluster,slot as u32,0,&dir.created) {
            dir_buf.append(&mut ent.to_bytes());
        }
        for (ent,dat) in sf.files() {
            let mut new_ent = ent.clone();
            new_ent.length = dat.len() as u32;
            new_ent.dir_entry = 0;
            new_ent.cluster = match dat.len() {
                0 => NO_CLUSTER,
                n => {
                    let chain = fat::allocate(n.div_ceil(cs),&mut self.fat,end)?;
                    for (i,c) in chain.iter().enumerate() {
                        let beg = i*cs;
                        self.write_rel_cluster(*c,&dat[beg..usize::min(beg+cs,dat.len())])?;
                    }
                    chain[0] as u32
                }
            };
            dir_buf.append(&mut new_ent.to_bytes());
        }
        for (i,c) in dir_chain.iter().enumerate() {
            let beg = i*cs;
            self.write_rel_cluster(*c,&dir_buf[beg..usize::min(beg+cs,dir_buf.len())])?;
        }
        if slot==root_len {
            if slot % epc == 0 {
                let new_cluster = fat::allocate(1,&mut self.fat,end)?[0];
                if let Some(last) = root_chain.last() {
                    fat::link(*last,new_cluster,&mut self.fat);
                }
                root_chain.push(new_cluster);
                self.write_rel_cluster(new_cluster,&vec![0;cs])?;
                debug!("root directory extended to cluster {}",new_cluster);
            }
        }
        if !free_old_first {
            for c in old_clusters {
                fat::deallocate(*c,&mut self.fat);
            }
        }
        dir.length = sf.len() as u32 + 2;
        dir.cluster = dir_chain[0] as u32;
        dir.dir_entry = 0;
        self.write_dir_entry(&root_chain,slot,&dir)?;
        if slot==root_len {
            let mut dot = self.root_dot()?;
            dot.length = root_len as u32 + 1;
            self.write_dir_entry(&root_chain,0,&dot)?;
        }
        self.writeback_fat()?;
        info!("imported {} into slot {}",dir.name,slot);
        Ok(())
    }
    /// Remove a save directory, freeing its clusters and those of its members.
    pub fn remove(&mut self,path: &str) -> STDRESULT {
        let nodes = self.normalize_path(path)?;
        if nodes.len()!=1 {
            error!("{} is not a save directory",path);
            return Err(Box::new(Error::NotADirectory));
        }
        let (root_chain,root_entries) = self.root()?;
        let (slot,mut save) = match Self::find(&root_entries,&nodes[0]) {
            Some((slot,ent)) if ent.is_dir() => (slot,ent),
            Some(_) => return Err(Box::new(Error::NotADirectory)),
            None => return Err(Box::new(Error::FileNotFound))
        };
        let clusters = self.owned_clusters(&save)?;
        for c in &clusters {
            fat::deallocate(*c,&mut self.fat);
        }
        save.mode &= !DF_EXISTS;
        self.write_dir_entry(&root_chain,slot,&save)?;
        self.writeback_fat()?;
        info!("removed {}, freed {} clusters",save.name,clusters.len());
        Ok(())
    }
    /// Bytes in free clusters
    pub fn free_space(&self) -> usize {
        fat::free_count(&self.fat,self.alloc_end()) * self.cluster_size()
    }
    /// Bytes available to saves on an empty card: the allocatable area less the root directory's cluster.
    pub fn allocatable_space(&self) -> usize {
        (self.alloc_end() - 1) * self.cluster_size()
    }
    /// Follow a chain for `check`, claiming each cluster.  The chain is cut short where it
    /// leaves the allocatable area, reaches a free cluster, or runs into a cluster already claimed.
    fn claim_chain(&mut self,first: u32,owned: &mut BitVec,label: &str,report: &mut CheckReport) -> Vec<usize> {
        let end = self.alloc_end();
        let mut ans = Vec::new();
        let first = first as usize;
        if first >= end || fat::is_free(first,&self.fat) || owned[first] {
            return ans;
        }
        let mut curr = first;
        loop {
            owned.set(curr,true);
            ans.push(curr);
            match fat::next(curr,&self.fat) {
                None => break,
                Some(next) => {
                    if next >= end || fat::is_free(next,&self.fat) || owned[next] {
                        warn!("{}: chain cut at cluster {}",label,curr);
                        report.repairs.push(format!("{}: chain truncated at cluster {}",label,curr));
                        fat::mark_last(curr,&mut self.fat);
                        break;
                    }
                    curr = next;
                }
            }
        }
        ans
    }
    /// Check the members of a directory, starting from slot 2, recursing into subdirectories.
    fn check_dir(&mut self,chain: &[usize],len: usize,label: &str,owned: &mut BitVec,report: &mut CheckReport) -> STDRESULT {
        let epc = self.entries_per_cluster();
        let cs = self.cluster_size();
        let entries = self.read_dir(chain,len)?;
        for (slot,mut ent) in entries.into_iter().enumerate().skip(2) {
            if !ent.exists() {
                continue;
            }
            let path = match label {
                "/" => format!("/{}",ent.name),
                _ => format!("{}/{}",label,ent.name)
            };
            if !ent.is_dir() && ent.length==0 {
                continue;
            }
            let sub = self.claim_chain(ent.cluster,owned,&path,report);
            let changed = match (sub.len(),ent.is_dir()) {
                (0,true) => {
                    warn!("{}: directory has no valid clusters, removing",path);
                    report.repairs.push(format!("{}: unreadable directory removed",path));
                    ent.mode &= !DF_EXISTS;
                    true
                },
                (0,false) => {
                    report.repairs.push(format!("{}: file has no valid clusters, emptied",path));
                    ent.cluster = NO_CLUSTER;
                    ent.length = 0;
                    true
                },
                (n,true) if n * epc < ent.length as usize => {
                    ent.length = (n * epc) as u32;
                    report.repairs.push(format!("{}: directory shortened to {} entries",path,ent.length));
                    true
                },
                (n,false) if n * cs < ent.length as usize => {
                    ent.length = (n * cs) as u32;
                    report.repairs.push(format!("{}: length reduced to {}",path,ent.length));
                    true
                },
                _ => false
            };
            if changed {
                self.write_dir_entry(chain,slot,&ent)?;
            }
            if ent.exists() && ent.is_dir() {
                self.check_dir(&sub,ent.length as usize,&path,owned,report)?;
            }
        }
        Ok(())
    }
    /// Walk every chain reachable from the root, repairing what can be repaired:
    /// chains that are broken or shared are truncated, entries too long for their chain are
    /// shortened, unreadable directories are removed, and allocated clusters nobody owns are freed.
    pub fn check(&mut self) -> Result<CheckReport,DYNERR> {
        let mut report = CheckReport::default();
        let end = self.alloc_end();
        let epc = self.entries_per_cluster();
        let mut owned = BitVec::from_elem(end,false);
        let mut root_dot = self.root_dot()?;
        let root_chain = self.claim_chain(self.sb.rootdir_cluster(),&mut owned,"/",&mut report);
        if root_chain.len()==0 {
            error!("root directory has no valid clusters");
            return Err(Box::new(Error::BadFAT));
        }
        if root_chain.len() * epc < root_dot.length as usize {
            root_dot.length = (root_chain.len() * epc) as u32;
            report.repairs.push(format!("/: root directory shortened to {} entries",root_dot.length));
            self.write_dir_entry(&root_chain,0,&root_dot)?;
        }
        self.check_dir(&root_chain,root_dot.length as usize,"/",&mut owned,&mut report)?;
        for n in 0..end {
            if !fat::is_free(n,&self.fat) && !owned[n] {
                trace!("lost cluster {}",n);
                fat::deallocate(n,&mut self.fat);
                report.lost_clusters += 1;
            }
        }
        if !report.is_clean() {
            warn!("check repaired the card: {}",report.to_string().replace('\n',"; "));
            self.writeback_fat()?;
        }
        Ok(report)
    }
}
