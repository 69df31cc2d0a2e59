//! ### File allocation table (FAT)
//! 
//! Module for manipulating the FAT of a memory card.  The entire FAT is buffered
//! as a vector of entries, the card is small enough that this costs little.
//! 
//! The FAT can be thought of as a cluster pool with forward links.
//! Each 32 bit entry tells us:
//! * whether the cluster is allocated (high bit)
//! * if allocated, the next cluster in the chain, or the end of chain marker
//! 
//! Cluster numbers are relative to the start of the allocatable area, and only the
//! first `alloc_end` entries correspond to real clusters.

use log::{trace,error};
use super::types::{Error,ALLOCATED,FREE_CLUSTER,CHAIN_END};
use crate::DYNERR;

const NEXT_MASK: u32 = 0x7fff_ffff;

pub fn is_free(n: usize,fat: &[u32]) -> bool {
    fat[n] & ALLOCATED == 0
}

/// Next cluster in the chain, or None if this is the last cluster.
/// The caller should already know the cluster is allocated.
pub fn next(n: usize,fat: &[u32]) -> Option<usize> {
    match fat[n] & NEXT_MASK {
        NEXT_MASK => None,
        x => Some(x as usize)
    }
}

pub fn deallocate(n: usize,fat: &mut [u32]) {
    fat[n] = FREE_CLUSTER;
}

pub fn mark_last(n: usize,fat: &mut [u32]) {
    fat[n] = CHAIN_END;
}

pub fn link(n: usize,next: usize,fat: &mut [u32]) {
    fat[n] = ALLOCATED | next as u32;
}

/// count free entries among the first `end` entries
pub fn free_count(fat: &[u32],end: usize) -> usize {
    fat[0..end].iter().filter(|x| *x & ALLOCATED == 0).count()
}

/// Follow a chain starting from `first`, returning every cluster in order.
/// Fails if the chain leaves the allocatable area, runs into a free cluster, or loops.
pub fn chain(first: usize,fat: &[u32],end: usize) -> Result<Vec<usize>,DYNERR> {
    let mut ans = Vec::new();
    let mut curr = first;
    for _i in 0..end {
        if curr >= end || is_free(curr,fat) {
            error!("chain from {} reaches invalid cluster {}",first,curr);
            return Err(Box::new(Error::BadFAT));
        }
        ans.push(curr);
        curr = match next(curr,fat) {
            None => return Ok(ans),
            Some(c) => c
        };
    }
    error!("chain from {} does not terminate",first);
    Err(Box::new(Error::BadFAT))
}

/// Allocate `count` clusters, first fit, linked into a chain that ends
/// with the last one.  Fails without changing anything if there is not enough room.
pub fn allocate(count: usize,fat: &mut [u32],end: usize) -> Result<Vec<usize>,DYNERR> {
    let ans: Vec<usize> = (0..end).filter(|n| is_free(*n,fat)).take(count).collect();
    if ans.len() < count {
        error!("need {} clusters, only {} are free",count,ans.len());
        return Err(Box::new(Error::DiskFull));
    }
    for i in 0..ans.len() {
        match i+1 < ans.len() {
            true => link(ans[i],ans[i+1],fat),
            false => mark_last(ans[i],fat)
        }
    }
    trace!("allocated clusters {:?}",ans);
    Ok(ans)
}

#[test]
fn allocate_and_free() {
    let mut fat = vec![FREE_CLUSTER;16];
    let a = allocate(3,&mut fat,16).expect("allocation failed");
    assert_eq!(a,vec![0,1,2]);
    let b = allocate(2,&mut fat,16).expect("allocation failed");
    assert_eq!(chain(3,&fat,16).expect("bad chain"),b);
    assert_eq!(free_count(&fat,16),11);
    for c in a {
        deallocate(c,&mut fat);
    }
    assert_eq!(free_count(&fat,16),14);
    let c = allocate(4,&mut fat,16).expect("allocation failed");
    assert_eq!(c,vec![0,1,2,5]);
    assert!(allocate(20,&mut fat,16).is_err());
    assert_eq!(free_count(&fat,16),10);
}

#[test]
fn bad_chains() {
    let mut fat = vec![FREE_CLUSTER;8];
    link(0,1,&mut fat);
    link(1,0,&mut fat);
    assert!(chain(0,&fat,8).is_err());
    link(1,2,&mut fat);
    assert!(chain(0,&fat,8).is_err());
    mark_last(2,&mut fat);
    assert_eq!(chain(0,&fat,8).expect("bad chain"),vec![0,1,2]);
    link(2,9,&mut fat);
    assert!(chain(0,&fat,8).is_err());
}
