//! ### Superblock
//! 
//! The superblock occupies the start of page 0.  It records the geometry the card was
//! formatted with, where the FAT is found (through the indirect FAT cluster list),
//! and the bounds of the allocatable area.  All multi-byte fields are little endian.

use log::{debug,error};
use a2kit_macro::{DiskStruct,DiskStructError};
use a2kit_macro_derive::DiskStruct;
use super::types::*;
use crate::img::geometry::Geometry;
use crate::{DYNERR,STDRESULT};

#[derive(DiskStruct)]
pub struct Superblock {
    magic: [u8;28],
    version: [u8;12],
    page_len: [u8;2],
    pages_per_cluster: [u8;2],
    pages_per_erase_block: [u8;2],
    unknown: [u8;2],
    clusters_per_card: [u8;4],
    alloc_offset: [u8;4],
    /// count of allocatable clusters, not an absolute cluster number
    alloc_end: [u8;4],
    /// relative to `alloc_offset`
    rootdir_cluster: [u8;4],
    backup_block1: [u8;4],
    backup_block2: [u8;4],
    reserved: [u8;8],
    /// absolute clusters holding the list of FAT clusters
    ifc_list: [u8;128],
    bad_erase_block_list: [u8;128],
    card_type: u8,
    card_flags: u8,
    reserved2: [u8;2]
}

fn u32_list(buf: &[u8]) -> Vec<u32> {
    buf.chunks_exact(4).map(|x| u32::from_le_bytes([x[0],x[1],x[2],x[3]])).collect()
}

macro_rules! field {
    ($root:ident,$slf:ident.$x:ident,$val:expr) => {
        $root[stringify!($x)] = json::JsonValue::new_object();
        $root[stringify!($x)]["_raw"] = json::JsonValue::String(hex::ToHex::encode_hex(&$slf.$x));
        $root[stringify!($x)]["_pretty"] = $val.into();
    };
}

/// Number of FAT clusters and indirect FAT clusters needed to map the card.
pub fn fat_cluster_counts(geom: &Geometry) -> (usize,usize) {
    let epc = geom.cluster_size() / 4;
    let fat_clusters = geom.clusters_per_card().div_ceil(epc);
    let indirect_clusters = fat_clusters.div_ceil(epc);
    (fat_clusters,indirect_clusters)
}

impl Superblock {
    /// Superblock for a freshly formatted card of the given geometry.
    /// Layout: indirect FAT clusters from cluster 8, then the FAT clusters, then the
    /// allocatable area, with the last two erase blocks held back as backup blocks.
    pub fn create(geom: &Geometry) -> Result<Self,DYNERR> {
        let (fat_clusters,indirect_clusters) = fat_cluster_counts(geom);
        if indirect_clusters > MAX_INDIRECT_CLUSTERS {
            error!("card is too large for the indirect FAT cluster list");
            return Err(Box::new(Error::GeometryMismatch));
        }
        let alloc_offset = FIRST_INDIRECT_CLUSTER + indirect_clusters + fat_clusters;
        let backup_block1 = geom.erase_blocks() - 1;
        let backup_block2 = geom.erase_blocks() - 2;
        let alloc_end = match (backup_block2 * geom.clusters_per_erase_block()).checked_sub(alloc_offset) {
            Some(n) if n > 1 => n,
            _ => {
                error!("card has no room for an allocatable area");
                return Err(Box::new(Error::GeometryMismatch));
            }
        };
        let mut ans = Self::new();
        ans.magic = *MAGIC;
        ans.version = *VERSION;
        ans.page_len = u16::to_le_bytes(geom.page_size() as u16);
        ans.pages_per_cluster = u16::to_le_bytes(geom.pages_per_cluster() as u16);
        ans.pages_per_erase_block = u16::to_le_bytes(geom.pages_per_erase_block() as u16);
        ans.unknown = [0x00,0xff];
        ans.clusters_per_card = u32::to_le_bytes(geom.clusters_per_card() as u32);
        ans.alloc_offset = u32::to_le_bytes(alloc_offset as u32);
        ans.alloc_end = u32::to_le_bytes(alloc_end as u32);
        ans.rootdir_cluster = [0;4];
        ans.backup_block1 = u32::to_le_bytes(backup_block1 as u32);
        ans.backup_block2 = u32::to_le_bytes(backup_block2 as u32);
        for i in 0..indirect_clusters {
            let c = u32::to_le_bytes((FIRST_INDIRECT_CLUSTER + i) as u32);
            ans.ifc_list[i*4..i*4+4].copy_from_slice(&c);
        }
        ans.bad_erase_block_list = [0xff;128];
        ans.card_type = CARD_TYPE_PS2;
        ans.card_flags = CARD_FLAGS;
        debug!("superblock: alloc offset {}, alloc end {}",alloc_offset,alloc_end);
        Ok(ans)
    }
    /// Check the magic and that the stored geometry and layout agree with `geom`.
    pub fn verify(&self,geom: &Geometry) -> STDRESULT {
        if &self.magic!=MAGIC {
            error!("superblock magic not found");
            return Err(Box::new(Error::NotFormatted));
        }
        if self.page_len() as usize!=geom.page_size()
            || self.pages_per_cluster() as usize!=geom.pages_per_cluster()
            || self.pages_per_erase_block() as usize!=geom.pages_per_erase_block()
            || self.clusters_per_card() as usize!=geom.clusters_per_card() {
            error!("superblock geometry {}x{}x{}x{} does not match image",
                self.page_len(),self.pages_per_cluster(),self.pages_per_erase_block(),self.clusters_per_card());
            return Err(Box::new(Error::GeometryMismatch));
        }
        let (fat_clusters,indirect_clusters) = fat_cluster_counts(geom);
        if indirect_clusters > MAX_INDIRECT_CLUSTERS
            || self.alloc_offset() as usize + self.alloc_end() as usize > geom.clusters_per_card()
            || (self.alloc_offset() as usize) < indirect_clusters + fat_clusters
            || self.rootdir_cluster() >= self.alloc_end() {
            error!("superblock layout is inconsistent");
            return Err(Box::new(Error::CorruptData));
        }
        Ok(())
    }
    pub fn page_len(&self) -> u16 {
        u16::from_le_bytes(self.page_len)
    }
    pub fn pages_per_cluster(&self) -> u16 {
        u16::from_le_bytes(self.pages_per_cluster)
    }
    pub fn pages_per_erase_block(&self) -> u16 {
        u16::from_le_bytes(self.pages_per_erase_block)
    }
    pub fn clusters_per_card(&self) -> u32 {
        u32::from_le_bytes(self.clusters_per_card)
    }
    pub fn alloc_offset(&self) -> u32 {
        u32::from_le_bytes(self.alloc_offset)
    }
    pub fn alloc_end(&self) -> u32 {
        u32::from_le_bytes(self.alloc_end)
    }
    pub fn rootdir_cluster(&self) -> u32 {
        u32::from_le_bytes(self.rootdir_cluster)
    }
    /// absolute clusters of the indirect FAT cluster list, `count` entries
    pub fn indirect_clusters(&self,count: usize) -> Vec<u32> {
        u32_list(&self.ifc_list)[0..usize::min(count,MAX_INDIRECT_CLUSTERS)].to_vec()
    }
    pub fn card_flags(&self) -> u8 {
        self.card_flags
    }
    /// Superblock as a JSON string, each field with its raw bytes and interpreted value.
    pub fn to_json(&self,indent: Option<u16>) -> String {
        let mut root = json::JsonValue::new_object();
        field!(root,self.magic,String::from_utf8_lossy(&self.magic).to_string());
        field!(root,self.version,String::from_utf8_lossy(&self.version).trim_end_matches('\0').to_string());
        field!(root,self.page_len,self.page_len());
        field!(root,self.pages_per_cluster,self.pages_per_cluster());
        field!(root,self.pages_per_erase_block,self.pages_per_erase_block());
        field!(root,self.clusters_per_card,self.clusters_per_card());
        field!(root,self.alloc_offset,self.alloc_offset());
        field!(root,self.alloc_end,self.alloc_end());
        field!(root,self.rootdir_cluster,self.rootdir_cluster());
        field!(root,self.backup_block1,u32::from_le_bytes(self.backup_block1));
        field!(root,self.backup_block2,u32::from_le_bytes(self.backup_block2));
        let ifc: Vec<u32> = u32_list(&self.ifc_list).into_iter().filter(|x| *x!=0).collect();
        field!(root,self.ifc_list,ifc);
        let bad: Vec<u32> = u32_list(&self.bad_erase_block_list).into_iter().filter(|x| *x!=0xffff_ffff).collect();
        field!(root,self.bad_erase_block_list,bad);
        root["card_type"] = self.card_type.into();
        root["card_flags"] = json::JsonValue::String(format!("{:#04x}",self.card_flags));
        match indent {
            Some(spaces) => json::stringify_pretty(root,spaces),
            None => json::stringify(root)
        }
    }
}

#[test]
fn standard_layout() {
    let geom = Geometry::standard(1,true).expect("bad geometry");
    let sb = Superblock::create(&geom).expect("could not create superblock");
    assert_eq!(sb.len(),340);
    assert_eq!(sb.alloc_offset(),41);
    assert_eq!(sb.alloc_end(),8135);
    assert_eq!(sb.indirect_clusters(1),vec![8]);
    let bytes = sb.to_bytes();
    assert_eq!(&bytes[0..28],MAGIC);
    let copy = Superblock::from_bytes(&bytes).expect("bad superblock");
    assert!(copy.verify(&geom).is_ok());
    let other = Geometry::standard(2,true).expect("bad geometry");
    match copy.verify(&other) {
        Ok(_) => panic!("verify should have failed"),
        Err(e) => assert_eq!(e.to_string(),"card geometry does not match superblock")
    }
}
