//! # Card Image Module
//! 
//! A memory card image is a flat array of pages.  When the image was dumped with ECC,
//! each page is followed by its spare area, otherwise the pages are packed together.
//! The `CardImage` object owns the image data and hands out pages and clusters,
//! verifying (and if possible correcting) the ECC as pages are read.
//! 
//! ## Relation to the File System
//! 
//! The `fs` module uses `CardImage` as its storage.  It addresses clusters by their
//! absolute number, the image translates that to pages and byte offsets.
//! Images are small, so the whole image is held in memory.  Nothing is permanent
//! until the caller writes `to_bytes()` somewhere.
//! 
//! ## Geometry
//! 
//! The `geometry` submodule describes page, erase block, and cluster sizes.
//! The `names` submodule has constants for standard cards.

pub mod names;
pub mod geometry;
pub mod ecc;

use log::{trace,debug,warn,error};
use geometry::Geometry;
use crate::{DYNERR,STDRESULT};

#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("ECC check failed and could not be corrected")]
    EccUncorrectable,
    #[error("geometry parameters are not supported")]
    InvalidGeometry,
    #[error("image size does not match geometry")]
    ImageSizeMismatch,
    #[error("page out of range")]
    PageOutOfRange,
    #[error("cluster out of range")]
    ClusterOutOfRange
}

/// Memory card image held in memory
pub struct CardImage {
    geom: Geometry,
    data: Vec<u8>
}

impl CardImage {
    /// Image with every page erased (all ones), with valid ECC if the geometry calls for it.
    pub fn blank(geom: Geometry) -> Self {
        let page = vec![0xff;geom.page_size()];
        let mut raw_page = page.clone();
        raw_page.append(&mut ecc::spare(&page,geom.spare_size()));
        let mut data = Vec::with_capacity(geom.image_len());
        for _i in 0..geom.pages_per_card() {
            data.extend_from_slice(&raw_page);
        }
        Self {
            geom,
            data
        }
    }
    /// Take ownership of image data, which must match the geometry exactly.
    pub fn from_bytes(geom: Geometry,data: Vec<u8>) -> Result<Self,DYNERR> {
        if data.len()!=geom.image_len() {
            error!("image length {} does not match geometry length {}",data.len(),geom.image_len());
            return Err(Box::new(Error::ImageSizeMismatch));
        }
        Ok(Self {
            geom,
            data
        })
    }
    /// Take ownership of image data, guessing the geometry from the length.
    pub fn from_bytestream(data: Vec<u8>) -> Result<Self,DYNERR> {
        match Geometry::from_image_len(data.len()) {
            Some(geom) => {
                debug!("image length matches {}",geom);
                Self::from_bytes(geom,data)
            },
            None => {
                error!("image length {} does not match any standard card",data.len());
                Err(Box::new(Error::ImageSizeMismatch))
            }
        }
    }
    pub fn geometry(&self) -> Geometry {
        self.geom
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
    fn page_offset(&self,page: usize) -> Result<usize,DYNERR> {
        if page >= self.geom.pages_per_card() {
            error!("page {} is beyond end of card",page);
            return Err(Box::new(Error::PageOutOfRange));
        }
        Ok(page * self.geom.raw_page_size())
    }
    /// Read the data portion of a page.  If there is ECC the returned data is corrected,
    /// but the image itself is left alone.
    pub fn read_page(&self,page: usize) -> Result<Vec<u8>,DYNERR> {
        let offset = self.page_offset(page)?;
        let page_size = self.geom.page_size();
        let mut ans = self.data[offset..offset+page_size].to_vec();
        if self.geom.has_ecc() {
            let mut codes = self.data[offset+page_size..offset+self.geom.raw_page_size()].to_vec();
            match ecc::verify_and_correct(&mut ans,&mut codes) {
                ecc::Check::Ok => {},
                ecc::Check::Corrected => warn!("corrected ECC error in page {}",page),
                ecc::Check::Uncorrectable => {
                    error!("uncorrectable ECC error in page {}",page);
                    return Err(Box::new(Error::EccUncorrectable));
                }
            }
        }
        Ok(ans)
    }
    /// Write the data portion of a page, computing the ECC if needed.
    /// Short data is padded with zeros.
    pub fn write_page(&mut self,page: usize,dat: &[u8]) -> STDRESULT {
        let offset = self.page_offset(page)?;
        let page_size = self.geom.page_size();
        let mut buf = vec![0;page_size];
        let actual = usize::min(dat.len(),page_size);
        buf[0..actual].copy_from_slice(&dat[0..actual]);
        if self.geom.has_ecc() {
            buf.append(&mut ecc::spare(&buf[0..page_size],self.geom.spare_size()));
        }
        self.data[offset..offset+buf.len()].copy_from_slice(&buf);
        Ok(())
    }
    fn cluster_in_rng(&self,cluster: usize) -> STDRESULT {
        if cluster >= self.geom.clusters_per_card() {
            error!("cluster {} is beyond end of card",cluster);
            return Err(Box::new(Error::ClusterOutOfRange));
        }
        Ok(())
    }
    /// Read an absolute cluster
    pub fn read_cluster(&self,cluster: usize) -> Result<Vec<u8>,DYNERR> {
        self.cluster_in_rng(cluster)?;
        trace!("read cluster {}",cluster);
        let ppc = self.geom.pages_per_cluster();
        let mut ans = Vec::with_capacity(self.geom.cluster_size());
        for page in cluster*ppc..(cluster+1)*ppc {
            ans.append(&mut self.read_page(page)?);
        }
        Ok(ans)
    }
    /// Write an absolute cluster, short data is padded with zeros.
    pub fn write_cluster(&mut self,cluster: usize,dat: &[u8]) -> STDRESULT {
        self.cluster_in_rng(cluster)?;
        trace!("write cluster {}",cluster);
        let ppc = self.geom.pages_per_cluster();
        let page_size = self.geom.page_size();
        for i in 0..ppc {
            let beg = usize::min(i*page_size,dat.len());
            let end = usize::min(beg+page_size,dat.len());
            self.write_page(cluster*ppc + i,&dat[beg..end])?;
        }
        Ok(())
    }
    /// Produce a copy of this image with or without ECC.  Going from ECC to no ECC
    /// fails if any page cannot be corrected.
    pub fn convert_ecc(&self,with_ecc: bool) -> Result<CardImage,DYNERR> {
        let new_geom = self.geom.with_ecc(with_ecc);
        if with_ecc==self.geom.has_ecc() {
            return Ok(Self { geom: new_geom, data: self.data.clone() });
        }
        let data = match with_ecc {
            true => ecc::add(&self.data,&new_geom)?,
            false => ecc::strip(&self.data,&self.geom)?
        };
        Self::from_bytes(new_geom,data)
    }
}

#[test]
fn page_round_trip() {
    let geom = Geometry::standard(names::CARD_8M,true).expect("bad geometry");
    let mut img = CardImage::blank(geom);
    let dat: Vec<u8> = (0..1024).map(|i| (i%256) as u8).collect();
    img.write_cluster(100,&dat).expect("write failed");
    assert_eq!(img.read_cluster(100).expect("read failed"),dat);
    // flip a bit in the stored data, reading should still succeed
    let offset = 201*geom.raw_page_size() + 17;
    img.data[offset] ^= 0x08;
    assert_eq!(img.read_cluster(100).expect("read failed"),dat);
    assert!(img.read_cluster(8192).is_err());
}

#[test]
fn convert_and_back() {
    let geom = Geometry::standard(names::CARD_8M,true).expect("bad geometry");
    let mut img = CardImage::blank(geom);
    img.write_page(5,&[1,2,3,4]).expect("write failed");
    let stripped = img.convert_ecc(false).expect("strip failed");
    assert_eq!(stripped.to_bytes().len(),8*1024*1024);
    assert_eq!(stripped.read_page(5).expect("read failed")[0..4],[1,2,3,4]);
    let restored = stripped.convert_ecc(true).expect("add failed");
    assert_eq!(restored.to_bytes(),img.to_bytes());
}
