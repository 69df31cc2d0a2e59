//! ### icon.sys
//! 
//! Every PS2 save directory carries an `icon.sys` file describing how the browser shows it:
//! background colors, lighting, the title, and the names of the icon models.
//! The title is Shift-JIS, split into two lines at a stored byte offset.

use std::io::Cursor;
use binrw::BinRead;
use super::directory::name_from_bytes;
use crate::DYNERR;

pub const ICON_SYS_NAME: &str = "icon.sys";
pub const ICON_SYS_LEN: usize = 964;

#[derive(BinRead,Debug,Clone)]
#[br(little, magic = b"PS2D")]
pub struct IconSys {
    _reserved1: u16,
    /// byte offset in the title where the second line begins
    pub line_break: u16,
    _reserved2: u32,
    pub bg_transparency: u32,
    pub bg_colors: [[u32;4];4],
    pub light_dirs: [[f32;4];3],
    pub light_colors: [[f32;4];3],
    pub ambient: [f32;4],
    title: [u8;68],
    icon_normal: [u8;64],
    icon_copy: [u8;64],
    icon_delete: [u8;64],
    _reserved3: [u8;512]
}

/// Full width characters that have an obvious ASCII counterpart.
fn sjis_punctuation(code: u16) -> Option<char> {
    let ans = match code {
        0x8140 => ' ',
        0x8141 | 0x8143 => ',',
        0x8142 | 0x8144 => '.',
        0x8146 => ':',
        0x8147 => ';',
        0x8148 => '?',
        0x8149 => '!',
        0x814f => '^',
        0x8151 => '_',
        0x815b | 0x815c | 0x815d | 0x817c => '-',
        0x815e => '/',
        0x815f => '\\',
        0x8160 => '~',
        0x8162 => '|',
        0x8165 | 0x8166 => '\'',
        0x8167 | 0x8168 => '"',
        0x8169 => '(',
        0x816a => ')',
        0x816d => '[',
        0x816e => ']',
        0x816f => '{',
        0x8170 => '}',
        0x8171 => '<',
        0x8172 => '>',
        0x817b => '+',
        0x8181 => '=',
        0x8183 => '<',
        0x8184 => '>',
        0x8190 => '$',
        0x8193 => '%',
        0x8194 => '#',
        0x8195 => '&',
        0x8196 => '*',
        0x8197 => '@',
        _ => return None
    };
    Some(ans)
}

/// Convert Shift-JIS to ASCII, as far as it can be done.
/// Full width letters, digits, and punctuation are mapped to ASCII, anything else becomes `?`.
/// Conversion stops at the first null.
pub fn sjis_to_ascii(buf: &[u8]) -> String {
    let mut ans = String::new();
    let mut i = 0;
    while i < buf.len() {
        let b = buf[i];
        if b==0 {
            break;
        }
        let is_lead = (0x81..=0x9f).contains(&b) || (0xe0..=0xfc).contains(&b);
        if !is_lead || i+1 >= buf.len() {
            ans.push(match b {
                0x20..=0x7e => b as char,
                _ => '?'
            });
            i += 1;
            continue;
        }
        let code = u16::from_be_bytes([b,buf[i+1]]);
        ans.push(match code {
            0x824f..=0x8258 => (b'0' + (code - 0x824f) as u8) as char,
            0x8260..=0x8279 => (b'A' + (code - 0x8260) as u8) as char,
            0x8281..=0x829a => (b'a' + (code - 0x8281) as u8) as char,
            _ => sjis_punctuation(code).unwrap_or('?')
        });
        i += 2;
    }
    ans
}

impl IconSys {
    /// Parse `icon.sys` data, which must start with the magic and be long enough.
    pub fn from_bytes(dat: &[u8]) -> Result<Self,DYNERR> {
        let mut curs = Cursor::new(dat);
        Ok(IconSys::read(&mut curs)?)
    }
    /// Title as two lines of ASCII.
    pub fn title(&self) -> (String,String) {
        let brk = usize::min(self.line_break as usize,self.title.len());
        (sjis_to_ascii(&self.title[0..brk]),sjis_to_ascii(&self.title[brk..]))
    }
    /// Title as a single line, with runs of whitespace collapsed.
    pub fn title_line(&self) -> String {
        let (l1,l2) = self.title();
        [l1,l2].join(" ").split_whitespace().collect::<Vec<&str>>().join(" ")
    }
    pub fn icon_normal(&self) -> String {
        name_from_bytes(&self.icon_normal)
    }
    pub fn icon_copy(&self) -> String {
        name_from_bytes(&self.icon_copy)
    }
    pub fn icon_delete(&self) -> String {
        name_from_bytes(&self.icon_delete)
    }
}

/// Build `icon.sys` data with a given title, for tests and for saves made from scratch.
/// The title is stored as-is, ASCII is legal Shift-JIS.
pub fn build(line1: &str,line2: &str,icon: &str) -> Vec<u8> {
    let mut ans = vec![0;ICON_SYS_LEN];
    ans[0..4].copy_from_slice(b"PS2D");
    let l1 = line1.as_bytes();
    let l2 = line2.as_bytes();
    let n1 = usize::min(l1.len(),68);
    let n2 = usize::min(l2.len(),68-n1);
    ans[6..8].copy_from_slice(&u16::to_le_bytes(n1 as u16));
    ans[0xc0..0xc0+n1].copy_from_slice(&l1[0..n1]);
    ans[0xc0+n1..0xc0+n1+n2].copy_from_slice(&l2[0..n2]);
    for offset in [0x104,0x144,0x184] {
        let n = usize::min(icon.len(),63);
        ans[offset..offset+n].copy_from_slice(&icon.as_bytes()[0..n]);
    }
    ans
}

#[test]
fn parse_title() {
    let mut dat = build("","","view.ico");
    // "ＡＢＣ　１２" then line break then "Save"
    let title: Vec<u8> = vec![0x82,0x60,0x82,0x61,0x82,0x62,0x81,0x40,0x82,0x50,0x82,0x51,b'S',b'a',b'v',b'e'];
    dat[0xc0..0xc0+title.len()].copy_from_slice(&title);
    dat[6] = 12;
    let icon = IconSys::from_bytes(&dat).expect("could not parse");
    assert_eq!(icon.title(),("ABC 12".to_string(),"Save".to_string()));
    assert_eq!(icon.title_line(),"ABC 12 Save");
    assert_eq!(icon.icon_normal(),"view.ico");
}

#[test]
fn bad_magic() {
    let mut dat = build("A","B","x.ico");
    dat[0] = b'X';
    assert!(IconSys::from_bytes(&dat).is_err());
    assert!(IconSys::from_bytes(&dat[0..100]).is_err());
}
