//! ### CodeBreaker saves
//! 
//! A CodeBreaker save (`.cbs`) is a header followed by a body that is zlib compressed and then
//! obscured with RC4 under a fixed key state.  The inflated body is a flat list of file records,
//! each a 64 byte header and the file data.
//! 
//! The body length field is written inconsistently: some producers store the compressed
//! length, others the length of the whole file including the header.  Both are accepted.

use std::io::{Cursor,Read,Write};
use binrw::{BinRead,BinWrite};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use log::{trace,debug,warn,error};
use super::{Error,FormatTag,SaveCodec,SaveFile};
use crate::fs::DirEntry;
use crate::fs::directory::{name_from_bytes,name_to_bytes};
use crate::fs::types::NAME_LEN;
use crate::fs::tod;
use crate::DYNERR;

pub const MAGIC: &[u8;4] = b"CFU\0";
/// smallest header that can hold every fixed field and a title
const MIN_HEADER_LEN: u32 = 92 + 32;
/// bytes of the header that precede the title
const FIXED_HEADER_LEN: u32 = 92;
const RECORD_LEN: usize = 64;
const ENCODE_HEADER_LEN: u32 = 0x128;
const ENCODE_D04: u32 = 0x1f40;

/// Initial RC4 state for CodeBreaker bodies.
pub const RC4_STATE: [u8;256] = [
    0x5f,0x1f,0x85,0x6f,0x31,0xaa,0x3b,0x18,0x21,0xb9,0xce,0x1c,0x07,0x4c,0x9c,0xb4,
    0x81,0xb8,0xef,0x98,0x59,0xae,0xf9,0x26,0xe3,0x80,0xa3,0x29,0x2d,0x73,0x51,0x62,
    0x7c,0x64,0x46,0xf4,0x34,0x1a,0xf6,0xe1,0xba,0x3a,0x0d,0x82,0x79,0x0a,0x5c,0x16,
    0x71,0x49,0x8e,0xac,0x8c,0x9f,0x35,0x19,0x45,0x94,0x3f,0x56,0x0c,0x91,0x00,0x0b,
    0xd7,0xb0,0xdd,0x39,0x66,0xa1,0x76,0x52,0x13,0x57,0xf3,0xbb,0x4e,0xe5,0xdc,0xf0,
    0x65,0x84,0xb2,0xd6,0xdf,0x15,0x3c,0x63,0x1d,0x89,0x14,0xbd,0xd2,0x36,0xfe,0xb1,
    0xca,0x8b,0xa4,0xc6,0x9e,0x67,0x47,0x37,0x42,0x6d,0x6a,0x03,0x92,0x70,0x05,0x7d,
    0x96,0x2f,0x40,0x90,0xc4,0xf1,0x3e,0x3d,0x01,0xf7,0x68,0x1e,0xc3,0xfc,0x72,0xb5,
    0x54,0xcf,0xe7,0x41,0xe4,0x4d,0x83,0x55,0x12,0x22,0x09,0x78,0xfa,0xde,0xa7,0x06,
    0x08,0x23,0xbf,0x0f,0xcc,0xc1,0x97,0x61,0xc5,0x4a,0xe6,0xa0,0x11,0xc2,0xea,0x74,
    0x02,0x87,0xd5,0xd1,0x9d,0xb7,0x7e,0x38,0x60,0x53,0x95,0x8d,0x25,0x77,0x10,0x5e,
    0x9b,0x7f,0xd8,0x6e,0xda,0xa2,0x2e,0x20,0x4f,0xcd,0x8f,0xcb,0xbe,0x5a,0xe0,0xed,
    0x2c,0x9a,0xd4,0xe2,0xaf,0xd0,0xa9,0xe8,0xad,0x7a,0xbc,0xa8,0xf2,0xee,0xeb,0xf5,
    0xa6,0x99,0x28,0x24,0x6c,0x2b,0x75,0x5d,0xf8,0xd3,0x86,0x17,0xfb,0xc0,0x7b,0xb3,
    0x58,0xdb,0xc7,0x4b,0xff,0x04,0x50,0xe9,0x88,0x69,0xc9,0x2a,0xab,0xfd,0x5b,0x1b,
    0x8a,0xd9,0xec,0x27,0x44,0x0e,0x33,0xc8,0x6b,0x93,0x32,0x48,0xb6,0x30,0x43,0xa5
];

#[derive(BinRead,BinWrite,Debug)]
#[brw(little,magic = b"CFU\0")]
struct Header {
    d04: u32,
    hlen: u32,
    /// length of the inflated body
    dlen: u32,
    /// length of the compressed body, or of the whole file
    flen: u32,
    dirname: [u8;32],
    created: [u8;8],
    modified: [u8;8],
    d44: u32,
    d48: u32,
    dirmode: u32,
    d50: u32,
    d54: u32,
    d58: u32,
    #[br(count = hlen.saturating_sub(FIXED_HEADER_LEN))]
    title: Vec<u8>
}

#[derive(BinRead,BinWrite,Debug)]
#[brw(little)]
struct Record {
    created: [u8;8],
    modified: [u8;8],
    size: u32,
    mode: u16,
    h06: u16,
    h08: u32,
    h0c: u32,
    name: [u8;32]
}

/// RC4 keystream applied in place, starting from the given state.
/// The transform is its own inverse.
pub fn rc4_crypt(state: &[u8;256],buf: &mut [u8]) {
    let mut s = *state;
    let mut j: u8 = 0;
    for ii in 0..buf.len() {
        let i = (ii + 1) % 256;
        j = j.wrapping_add(s[i]);
        s.swap(i,j as usize);
        buf[ii] ^= s[s[i].wrapping_add(s[j as usize]) as usize];
    }
}

/// Timestamp field, or the current time if it is unset
fn time_or_now(tod: &[u8;8],what: &str,name: &str) -> chrono::NaiveDateTime {
    match tod::unpack(tod) {
        Some(t) => t,
        None => {
            warn!("{} time of `{}` is unset, using current time",what,name);
            tod::now()
        }
    }
}

pub struct CodeBreaker;

impl CodeBreaker {
    /// Pick out the compressed body, trying both meanings of the body length.
    fn body<'a>(dat: &'a [u8],hlen: usize,flen: usize) -> Result<&'a [u8],DYNERR> {
        let avail = dat.len() - hlen;
        if avail >= flen {
            return Ok(&dat[hlen..hlen+flen]);
        }
        if flen >= hlen && avail==flen-hlen {
            debug!("body length counts the header");
            return Ok(&dat[hlen..]);
        }
        error!("body needs {} bytes, {} available",flen,avail);
        Err(Box::new(Error::UnexpectedEndOfInput))
    }
    fn inflate(body: &[u8],dlen: usize) -> Result<Vec<u8>,DYNERR> {
        let mut ans = Vec::new();
        let mut decoder = ZlibDecoder::new(body).take(dlen as u64);
        match decoder.read_to_end(&mut ans) {
            Ok(_) => Ok(ans),
            Err(e) => {
                error!("could not inflate body: {}",e);
                Err(Box::new(Error::CorruptData))
            }
        }
    }
}

impl SaveCodec for CodeBreaker {
    fn tag(&self) -> FormatTag {
        FormatTag::Cbs
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["cbs"]
    }
    fn sniff(&self,hdr: &[u8]) -> bool {
        hdr.starts_with(MAGIC)
    }
    fn decode(&self,dat: &[u8]) -> Result<SaveFile,DYNERR> {
        if !self.sniff(dat) {
            error!("CodeBreaker magic not found");
            return Err(Box::new(Error::CorruptData));
        }
        if dat.len() < 12 {
            return Err(Box::new(Error::UnexpectedEndOfInput));
        }
        let hlen = u32::from_le_bytes([dat[8],dat[9],dat[10],dat[11]]);
        if hlen < MIN_HEADER_LEN {
            error!("header length {} is too short",hlen);
            return Err(Box::new(Error::CorruptData));
        }
        if dat.len() < hlen as usize {
            error!("header length {} exceeds file",hlen);
            return Err(Box::new(Error::UnexpectedEndOfInput));
        }
        let hdr = match Header::read(&mut Cursor::new(dat)) {
            Ok(h) => h,
            Err(e) => {
                error!("bad header: {}",e);
                return Err(Box::new(Error::CorruptData));
            }
        };
        let dirname = name_from_bytes(&hdr.dirname);
        trace!("header: d04 {:#x}, title `{}`",hdr.d04,name_from_bytes(&hdr.title));
        let mut body = Self::body(dat,hlen as usize,hdr.flen as usize)?.to_vec();
        rc4_crypt(&RC4_STATE,&mut body);
        let body = Self::inflate(&body,hdr.dlen as usize)?;
        let mut save = SaveFile::new();
        let mut offset = 0;
        while offset < body.len() {
            if body.len() - offset < RECORD_LEN {
                error!("truncated file record at {}",offset);
                return Err(Box::new(Error::UnexpectedEndOfInput));
            }
            let rec = Record::read(&mut Cursor::new(&body[offset..offset+RECORD_LEN]))?;
            let name = name_from_bytes(&rec.name);
            let size = rec.size as usize;
            offset += RECORD_LEN;
            if body.len() - offset < size {
                error!("`{}` needs {} bytes, {} remain",name,size,body.len()-offset);
                return Err(Box::new(Error::UnexpectedEndOfInput));
            }
            let ent = DirEntry {
                mode: rec.mode,
                length: rec.size,
                created: time_or_now(&rec.created,"created",&name),
                cluster: 0,
                dir_entry: 0,
                modified: time_or_now(&rec.modified,"modified",&name),
                attr: 0,
                name
            };
            if !ent.is_file() {
                error!("`{}` has mode {:#06x}, not a file",ent.name,ent.mode);
                return Err(Box::new(Error::UnsupportedEntryKind));
            }
            save.set_file(save.len(),ent,body[offset..offset+size].to_vec())?;
            offset += size;
        }
        let mut dir = DirEntry {
            mode: hdr.dirmode as u16,
            length: save.len() as u32,
            created: time_or_now(&hdr.created,"created",&dirname),
            cluster: 0,
            dir_entry: 0,
            modified: time_or_now(&hdr.modified,"modified",&dirname),
            attr: 0,
            name: dirname
        };
        dir.coerce_dir_mode();
        save.set_directory(dir);
        Ok(save)
    }
    fn encode(&self,save: &SaveFile) -> Result<Vec<u8>,DYNERR> {
        let mut plain = Vec::new();
        for (ent,dat) in save.files() {
            let rec = Record {
                created: tod::pack(&ent.created),
                modified: tod::pack(&ent.modified),
                size: dat.len() as u32,
                mode: ent.mode,
                h06: 0,
                h08: 0,
                h0c: 0,
                name: name_to_bytes::<NAME_LEN>(&ent.name)
            };
            let mut curs = Cursor::new(Vec::new());
            rec.write(&mut curs)?;
            plain.append(&mut curs.into_inner());
            plain.extend_from_slice(dat);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(),Compression::default());
        encoder.write_all(&plain)?;
        let mut body = encoder.finish()?;
        rc4_crypt(&RC4_STATE,&mut body);
        let dir = save.get_directory();
        let title = match save.icon_sys() {
            Some(icon) => icon.title_line(),
            None => String::new()
        };
        let mut title_bytes = vec![0;(ENCODE_HEADER_LEN - FIXED_HEADER_LEN) as usize];
        let n = usize::min(title.len(),title_bytes.len()-1);
        title_bytes[0..n].copy_from_slice(&title.as_bytes()[0..n]);
        let hdr = Header {
            d04: ENCODE_D04,
            hlen: ENCODE_HEADER_LEN,
            dlen: plain.len() as u32,
            flen: body.len() as u32,
            dirname: name_to_bytes::<NAME_LEN>(&dir.name),
            created: tod::pack(&dir.created),
            modified: tod::pack(&dir.modified),
            d44: 0,
            d48: 0,
            dirmode: dir.mode as u32,
            d50: 0,
            d54: 0,
            d58: 0,
            title: title_bytes
        };
        let mut curs = Cursor::new(Vec::new());
        hdr.write(&mut curs)?;
        let mut ans = curs.into_inner();
        ans.append(&mut body);
        Ok(ans)
    }
}

#[cfg(test)]
use super::test_save;

#[test]
fn keystream_is_self_inverse() {
    let orig: Vec<u8> = (0..600).map(|x| (x % 256) as u8).collect();
    let mut buf = orig.clone();
    rc4_crypt(&RC4_STATE,&mut buf);
    assert_ne!(buf,orig);
    rc4_crypt(&RC4_STATE,&mut buf);
    assert_eq!(buf,orig);
}

#[test]
fn round_trip() {
    let save = test_save("BASLUS-20001SAVE",&[10,20000]);
    let dat = CodeBreaker.encode(&save).expect("encode failed");
    assert_eq!(&dat[0..4],MAGIC);
    let copy = CodeBreaker.decode(&dat).expect("decode failed");
    assert_eq!(copy,save);
    assert_eq!(copy.get_file(1).expect("missing file").1.len(),20000);
}

#[test]
fn body_length_with_header() {
    let save = test_save("SAVE",&[300]);
    let mut dat = CodeBreaker.encode(&save).expect("encode failed");
    let total = dat.len() as u32;
    dat[16..20].copy_from_slice(&u32::to_le_bytes(total));
    let copy = CodeBreaker.decode(&dat).expect("decode failed");
    assert_eq!(copy,save);
}

#[test]
fn truncated() {
    let save = test_save("SAVE",&[5000]);
    let dat = CodeBreaker.encode(&save).expect("encode failed");
    for cut in [dat.len()-1,200,40,6] {
        match CodeBreaker.decode(&dat[0..cut]) {
            Ok(_) => panic!("truncated save decoded"),
            Err(e) => assert_eq!(e.to_string(),"unexpected end of input")
        }
    }
}

#[test]
fn short_header() {
    let save = test_save("SAVE",&[5]);
    let mut dat = CodeBreaker.encode(&save).expect("encode failed");
    dat[8..12].copy_from_slice(&u32::to_le_bytes(100));
    match CodeBreaker.decode(&dat) {
        Ok(_) => panic!("short header accepted"),
        Err(e) => assert_eq!(e.to_string(),"save file is corrupt")
    }
}

#[test]
fn coerce_and_default() {
    let mut save = test_save("SAVE",&[5]);
    let mut dir = save.get_directory().clone();
    dir.mode = 0x0010;
    save.set_directory(dir);
    let mut dat = CodeBreaker.encode(&save).expect("encode failed");
    // zero the directory's created time
    dat[0x34..0x3c].copy_from_slice(&[0;8]);
    let before = tod::now();
    let copy = CodeBreaker.decode(&dat).expect("decode failed");
    let dir = copy.get_directory();
    assert_eq!(dir.mode,crate::fs::types::CANONICAL_DIR_MODE);
    assert!(dir.created >= before);
    assert!(dir.created <= tod::now());
}

#[test]
fn nested_directory_rejected() {
    let mut save = test_save("SAVE",&[5]);
    let (mut ent,dat) = save.get_file(0).expect("missing file").clone();
    ent.mode = crate::fs::types::CANONICAL_DIR_MODE;
    save.set_file(0,ent,dat).expect("bad index");
    let dat = CodeBreaker.encode(&save).expect("encode failed");
    match CodeBreaker.decode(&dat) {
        Ok(_) => panic!("subdirectory accepted"),
        Err(e) => assert_eq!(e.to_string(),"save file contains a subdirectory")
    }
}
