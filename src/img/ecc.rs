//! ### Error correction codes
//! 
//! The card controller protects each 128 byte chunk of a page with a 3 byte Hamming code:
//! one column parity byte and two line parity bytes.  The codes for a page are stored
//! consecutively in the page's spare area, each padded to 4 bytes.
//! 
//! A single flipped bit in either the data or the code can be located and repaired.
//! Anything worse is reported as uncorrectable, the caller decides what to do about it.

use log::{debug,error};
use super::names::{ECC_CHUNK,ECC_SPARE_PER_CHUNK};
use super::geometry::Geometry;
use super::Error;
use crate::DYNERR;

/// outcome of checking data against its code
#[derive(PartialEq,Eq,Debug,Clone,Copy)]
pub enum Check {
    Ok,
    Corrected,
    Uncorrectable
}

const fn parity(b: u8) -> u8 {
    (b.count_ones() & 1) as u8
}

const fn column_parity_mask(b: u8) -> u8 {
    parity(b & 0x55) | parity(b & 0x33) << 1 | parity(b & 0x0f) << 2 |
    parity(b & 0xaa) << 4 | parity(b & 0xcc) << 5 | parity(b & 0xf0) << 6
}

const fn column_parity_table() -> [u8;256] {
    let mut ans = [0;256];
    let mut i = 0;
    while i < 256 {
        ans[i] = column_parity_mask(i as u8);
        i += 1;
    }
    ans
}

const COLUMN_PARITY: [u8;256] = column_parity_table();

/// Code for one chunk of at most 128 bytes.
pub fn calc_chunk(chunk: &[u8]) -> [u8;3] {
    let mut cp: u8 = 0x77;
    let mut lp0: u8 = 0x7f;
    let mut lp1: u8 = 0x7f;
    for (i,b) in chunk.iter().enumerate() {
        cp ^= COLUMN_PARITY[*b as usize];
        if parity(*b)==1 {
            lp0 ^= !(i as u8);
            lp1 ^= i as u8;
        }
    }
    [cp,lp0 & 0x7f,lp1]
}

/// Check one chunk against its code, repairing either one in place if a single bit is wrong.
pub fn check_chunk(chunk: &mut [u8],code: &mut [u8]) -> Check {
    let computed = calc_chunk(chunk);
    if computed[..]==code[0..3] {
        return Check::Ok;
    }
    let cp_diff = (computed[0] ^ code[0]) & 0x77;
    let lp0_diff = (computed[1] ^ code[1]) & 0x7f;
    let lp1_diff = (computed[2] ^ code[2]) & 0x7f;
    let lp_comp = lp0_diff ^ lp1_diff;
    let cp_comp = (cp_diff >> 4) ^ (cp_diff & 0x07);
    if lp_comp==0x7f && cp_comp==0x07 {
        // single bit error in the data
        let offset = lp1_diff as usize;
        if offset >= chunk.len() {
            return Check::Uncorrectable;
        }
        debug!("correcting bit {} of byte {}",cp_diff >> 4,offset);
        chunk[offset] ^= 1 << (cp_diff >> 4);
        return Check::Corrected;
    }
    if (cp_diff==0 && lp0_diff==0 && lp1_diff==0) || lp_comp.count_ones() + cp_comp.count_ones() == 1 {
        // single bit error in the code itself
        code[0..3].copy_from_slice(&computed);
        return Check::Corrected;
    }
    Check::Uncorrectable
}

/// Codes for a whole page, 3 bytes per chunk with no padding.
pub fn compute(page: &[u8]) -> Vec<u8> {
    page.chunks(ECC_CHUNK).flat_map(|chunk| calc_chunk(chunk)).collect()
}

/// Spare area for a page, the codes padded to `spare_size`.
pub fn spare(page: &[u8],spare_size: usize) -> Vec<u8> {
    let mut ans = vec![0;spare_size];
    for (i,chunk) in page.chunks(ECC_CHUNK).enumerate() {
        let offset = i*3;
        if offset + 3 > spare_size {
            break;
        }
        ans[offset..offset+3].copy_from_slice(&calc_chunk(chunk));
    }
    ans
}

/// Check every chunk of a page against the codes in `codes` (the spare area).
/// Repairs are made in place.  The worst outcome of any chunk is returned.
pub fn verify_and_correct(page: &mut [u8],codes: &mut [u8]) -> Check {
    let mut ans = Check::Ok;
    for (i,chunk) in page.chunks_mut(ECC_CHUNK).enumerate() {
        let offset = i*3;
        if offset + 3 > codes.len() {
            return Check::Uncorrectable;
        }
        match check_chunk(chunk,&mut codes[offset..offset+3]) {
            Check::Ok => {},
            Check::Corrected => if ans==Check::Ok {
                ans = Check::Corrected
            },
            Check::Uncorrectable => return Check::Uncorrectable
        }
    }
    ans
}

/// Remove the spare area from every page of an ECC image.
/// The geometry describes the image with ECC.  Each page is corrected before the
/// code is thrown away, an uncorrectable page is an error.
pub fn strip(img: &[u8],geom: &Geometry) -> Result<Vec<u8>,DYNERR> {
    if !geom.has_ecc() || img.len()!=geom.image_len() {
        error!("image does not match ECC geometry");
        return Err(Box::new(Error::ImageSizeMismatch));
    }
    let page_size = geom.page_size();
    let raw = geom.raw_page_size();
    let mut ans = Vec::with_capacity(geom.pages_per_card()*page_size);
    for (n,raw_page) in img.chunks(raw).enumerate() {
        let mut page = raw_page[0..page_size].to_vec();
        let mut codes = raw_page[page_size..].to_vec();
        if verify_and_correct(&mut page,&mut codes)==Check::Uncorrectable {
            error!("page {} cannot be corrected",n);
            return Err(Box::new(Error::EccUncorrectable));
        }
        ans.append(&mut page);
    }
    Ok(ans)
}

/// Compute a spare area for every page of an image without ECC.
/// The geometry describes the image with ECC, i.e., the result.
pub fn add(img: &[u8],geom: &Geometry) -> Result<Vec<u8>,DYNERR> {
    let page_size = geom.page_size();
    if !geom.has_ecc() || img.len()!=geom.pages_per_card()*page_size {
        error!("image does not match geometry without ECC");
        return Err(Box::new(Error::ImageSizeMismatch));
    }
    let mut ans = Vec::with_capacity(geom.image_len());
    for page in img.chunks(page_size) {
        ans.extend_from_slice(page);
        ans.append(&mut spare(page,geom.spare_size()));
    }
    Ok(ans)
}

/// spare bytes needed by a page of the given size
pub fn spare_size(page_size: usize) -> usize {
    (page_size / ECC_CHUNK) * ECC_SPARE_PER_CHUNK
}

#[test]
fn erased_chunk() {
    let chunk = [0xff;128];
    assert_eq!(calc_chunk(&chunk),[0x77,0x7f,0x7f]);
    let chunk = [0;128];
    assert_eq!(calc_chunk(&chunk),[0x77,0x7f,0x7f]);
}

#[test]
fn correct_data_bit() {
    let mut page: Vec<u8> = (0..512).map(|i| (i*7 % 251) as u8).collect();
    let orig = page.clone();
    let mut codes = spare(&page,16);
    page[300] ^= 0x20;
    assert_eq!(verify_and_correct(&mut page,&mut codes),Check::Corrected);
    assert_eq!(page,orig);
    assert_eq!(verify_and_correct(&mut page,&mut codes),Check::Ok);
}

#[test]
fn correct_code_bit() {
    let mut page: Vec<u8> = (0..512).map(|i| (i*13 % 256) as u8).collect();
    let orig = page.clone();
    let good = spare(&page,16);
    let mut codes = good.clone();
    codes[4] ^= 0x02;
    assert_eq!(verify_and_correct(&mut page,&mut codes),Check::Corrected);
    assert_eq!(page,orig);
    assert_eq!(codes,good);
}

#[test]
fn double_bit_error() {
    let mut page: Vec<u8> = (0..512).map(|i| (i*3 % 256) as u8).collect();
    let mut codes = spare(&page,16);
    page[10] ^= 0x01;
    page[77] ^= 0x40;
    assert_eq!(verify_and_correct(&mut page,&mut codes),Check::Uncorrectable);
}
