//! ### Card geometry
//! 
//! The geometry is the immutable description of an image's page and cluster layout.
//! Whether the image carries ECC is part of the geometry, since it changes the
//! position of every page.

use std::fmt;
use log::error;
use super::names::*;
use super::{ecc,Error};
use crate::DYNERR;

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub struct Geometry {
    page_size: usize,
    pages_per_erase_block: usize,
    pages_per_cluster: usize,
    pages_per_card: usize,
    spare_size: usize
}

impl Geometry {
    /// Create a geometry, checking that the parameters describe a possible card.
    /// Page size must be a power of two that divides the cluster size, and erase blocks
    /// must be whole numbers of clusters.
    pub fn new(page_size: usize,pages_per_erase_block: usize,pages_per_card: usize,with_ecc: bool) -> Result<Self,DYNERR> {
        if !page_size.is_power_of_two() || page_size < ECC_CHUNK || page_size > CLUSTER_SIZE {
            error!("page size {} is not supported",page_size);
            return Err(Box::new(Error::InvalidGeometry));
        }
        let pages_per_cluster = CLUSTER_SIZE / page_size;
        if !pages_per_erase_block.is_power_of_two() || pages_per_erase_block % pages_per_cluster != 0 {
            error!("erase block of {} pages does not align with clusters",pages_per_erase_block);
            return Err(Box::new(Error::InvalidGeometry));
        }
        if !pages_per_card.is_power_of_two() || pages_per_card % pages_per_erase_block != 0 || pages_per_card < 64*pages_per_erase_block {
            error!("card with {} pages is not supported",pages_per_card);
            return Err(Box::new(Error::InvalidGeometry));
        }
        let spare_size = match with_ecc {
            true => ecc::spare_size(page_size),
            false => 0
        };
        Ok(Self {
            page_size,
            pages_per_erase_block,
            pages_per_cluster,
            pages_per_card,
            spare_size
        })
    }
    /// Standard card scaled by `multiplier` (1, 2, 4, or 8).
    pub fn standard(multiplier: usize,with_ecc: bool) -> Result<Self,DYNERR> {
        if !SIZE_MULTIPLIERS.contains(&multiplier) {
            error!("card size multiplier must be one of {:?}",SIZE_MULTIPLIERS);
            return Err(Box::new(Error::InvalidGeometry));
        }
        Self::new(PAGE_SIZE,PAGES_PER_ERASE_BLOCK,PAGES_PER_CARD*multiplier,with_ecc)
    }
    /// Guess the standard geometry that produces an image of the given length.
    pub fn from_image_len(len: usize) -> Option<Self> {
        for multiplier in SIZE_MULTIPLIERS {
            for with_ecc in [true,false] {
                if let Ok(geom) = Self::standard(multiplier,with_ecc) {
                    if geom.image_len()==len {
                        return Some(geom);
                    }
                }
            }
        }
        None
    }
    /// Same layout with or without the spare area.
    pub fn with_ecc(&self,with_ecc: bool) -> Self {
        let mut ans = *self;
        ans.spare_size = match with_ecc {
            true => ecc::spare_size(self.page_size),
            false => 0
        };
        ans
    }
    pub fn page_size(&self) -> usize {
        self.page_size
    }
    pub fn pages_per_erase_block(&self) -> usize {
        self.pages_per_erase_block
    }
    pub fn pages_per_cluster(&self) -> usize {
        self.pages_per_cluster
    }
    pub fn pages_per_card(&self) -> usize {
        self.pages_per_card
    }
    pub fn spare_size(&self) -> usize {
        self.spare_size
    }
    pub fn has_ecc(&self) -> bool {
        self.spare_size > 0
    }
    /// bytes occupied by a page in the image, including the spare area
    pub fn raw_page_size(&self) -> usize {
        self.page_size + self.spare_size
    }
    pub fn cluster_size(&self) -> usize {
        self.page_size * self.pages_per_cluster
    }
    pub fn clusters_per_card(&self) -> usize {
        self.pages_per_card / self.pages_per_cluster
    }
    pub fn clusters_per_erase_block(&self) -> usize {
        self.pages_per_erase_block / self.pages_per_cluster
    }
    pub fn erase_blocks(&self) -> usize {
        self.pages_per_card / self.pages_per_erase_block
    }
    /// total length of the image file
    pub fn image_len(&self) -> usize {
        self.pages_per_card * self.raw_page_size()
    }
    /// total bytes of data, before any file system overhead
    pub fn capacity(&self) -> usize {
        self.pages_per_card * self.page_size
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,"{} MB card, {} byte pages, {}",self.capacity()/(1<<20),self.page_size,match self.has_ecc() {
            true => "with ECC",
            false => "without ECC"
        })
    }
}

#[test]
fn standard_sizes() {
    let geom = Geometry::standard(CARD_8M,true).expect("bad geometry");
    assert_eq!(geom.image_len(),8650752);
    assert_eq!(geom.clusters_per_card(),8192);
    assert_eq!(geom.spare_size(),16);
    let geom = Geometry::standard(CARD_64M,false).expect("bad geometry");
    assert_eq!(geom.image_len(),64*1024*1024);
    assert_eq!(geom.clusters_per_erase_block(),8);
    assert!(Geometry::standard(3,false).is_err());
}

#[test]
fn guess_from_len() {
    let geom = Geometry::from_image_len(8650752).expect("no match");
    assert!(geom.has_ecc());
    assert_eq!(geom.pages_per_card(),PAGES_PER_CARD);
    let geom = Geometry::from_image_len(16*1024*1024).expect("no match");
    assert!(!geom.has_ecc());
    assert_eq!(geom.pages_per_card(),2*PAGES_PER_CARD);
    assert_eq!(Geometry::from_image_len(1000),None);
}
