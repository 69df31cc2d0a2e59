// test of the memory card file system
use ps2kit::img::{CardImage,names,geometry::Geometry};
use ps2kit::fs::{self,Card,DirEntry};
use ps2kit::fs::types::{CANONICAL_DIR_MODE,DEFAULT_FILE_MODE};
use ps2kit::fs::icon_sys;
use ps2kit::save::{SaveFile,Registry,FormatTag};

const CLUSTER: usize = 1024;
/// absolute cluster of the first FAT cluster on an 8 MB card
const FAT_CLUSTER: usize = 9;

fn make_save(name: &str,title: &str,sizes: &[usize]) -> SaveFile {
    let mut ans = SaveFile::new();
    let icon = icon_sys::build(title,"","icon.ico");
    ans.set_file(0,DirEntry::new(icon_sys::ICON_SYS_NAME,DEFAULT_FILE_MODE,icon.len() as u32),icon).expect("bad index");
    for (i,sz) in sizes.iter().enumerate() {
        let dat: Vec<u8> = (0..*sz).map(|x| ((x*13+i) % 256) as u8).collect();
        ans.set_file(i+1,DirEntry::new(&format!("data{}",i),DEFAULT_FILE_MODE,*sz as u32),dat).expect("bad index");
    }
    ans.set_directory(DirEntry::new(name,CANONICAL_DIR_MODE,ans.len() as u32));
    ans
}

fn new_card(with_ecc: bool) -> Card {
    let geom = Geometry::standard(names::CARD_8M,with_ecc).expect("bad geometry");
    Card::format(geom).expect("format failed")
}

fn reopen(card: &mut Card) -> Card {
    ps2kit::create_card_from_bytestream(card.to_bytes().expect("writeback failed")).expect("reopen failed")
}

fn err_kind(e: &Box<dyn std::error::Error>) -> Option<&fs::Error> {
    e.downcast_ref::<fs::Error>()
}

fn set_fat_entry(dat: &mut [u8],n: usize,val: u32) {
    let offset = FAT_CLUSTER*CLUSTER + n*4;
    dat[offset..offset+4].copy_from_slice(&u32::to_le_bytes(val));
}

#[test]
fn format_capacity() {
    for with_ecc in [true,false] {
        let mut card = new_card(with_ecc);
        assert_eq!(card.allocatable_space(),8134*CLUSTER);
        assert_eq!(card.free_space(),card.allocatable_space());
        let card = reopen(&mut card);
        assert_eq!(card.free_space(),card.allocatable_space());
        let names: Vec<String> = card.list("/").expect("list failed").map(|e| e.expect("bad entry").name).collect();
        assert_eq!(names,vec![".",".."]);
        assert_eq!(card.saves().expect("list failed").len(),0);
    }
}

#[test]
fn import_and_export() {
    let mut card = new_card(true);
    let save = make_save("BASLUS-20001SAVE","Test Game",&[10,20000]);
    let free = card.free_space();
    card.import(&save,false).expect("import failed");
    // 3 directory clusters, 22 data clusters, 1 to extend the root
    assert_eq!(free - card.free_space(),26*CLUSTER);
    assert!(free - card.free_space() >= (20010usize.div_ceil(CLUSTER) + 3)*CLUSTER);
    let card = reopen(&mut card);
    assert_eq!(card.entry_size("/BASLUS-20001SAVE").expect("size failed"),icon_sys::ICON_SYS_LEN + 20010);
    assert_eq!(card.entry_footprint("/BASLUS-20001SAVE").expect("size failed"),25*CLUSTER);
    let icon = card.read_icon_metadata("/BASLUS-20001SAVE").expect("read failed").expect("no icon.sys");
    assert_eq!(icon.title_line(),"Test Game");
    let member = card.open_member("/BASLUS-20001SAVE","data1").expect("open failed");
    assert_eq!(member.into_inner(),save.get_file(2).expect("missing file").1);
    let names: Vec<String> = card.list("/BASLUS-20001SAVE").expect("list failed").map(|e| e.expect("bad entry").name).collect();
    assert_eq!(names,vec![".","..","icon.sys","data0","data1"]);
    assert_eq!(card.export("/BASLUS-20001SAVE").expect("export failed"),save);
}

#[test]
fn listing_rewinds() {
    let mut card = new_card(false);
    card.import(&make_save("A","",&[]),false).expect("import failed");
    card.import(&make_save("B","",&[]),false).expect("import failed");
    let mut listing = card.list("/").expect("list failed");
    let first: Vec<String> = listing.by_ref().map(|e| e.expect("bad entry").name).collect();
    assert_eq!(first,vec![".","..","A","B"]);
    listing.rewind();
    assert_eq!(listing.next().expect("no entry").expect("bad entry").name,".");
}

#[test]
fn name_collision() {
    let mut card = new_card(true);
    card.import(&make_save("SAVE","one",&[3000]),false).expect("import failed");
    let free = card.free_space();
    match card.import(&make_save("SAVE","two",&[10]),false) {
        Ok(_) => panic!("collision not detected"),
        Err(e) => assert!(matches!(err_kind(&e),Some(fs::Error::NameCollision)))
    }
    assert_eq!(card.free_space(),free);
    let replacement = make_save("SAVE","two",&[5000]);
    card.import(&replacement,true).expect("overwrite failed");
    assert_eq!(card.saves().expect("list failed").len(),1);
    assert_eq!(card.export("SAVE").expect("export failed"),replacement);
    // root extension 1, directory 2, icon.sys 1, data 5
    assert_eq!(card.allocatable_space() - card.free_space(),9*CLUSTER);
    assert!(card.check().expect("check failed").is_clean());
}

#[test]
fn disk_full() {
    let mut card = new_card(false);
    let free = card.free_space();
    let huge = make_save("HUGE","",&[free]);
    match card.import(&huge,false) {
        Ok(_) => panic!("import should not fit"),
        Err(e) => assert!(matches!(err_kind(&e),Some(fs::Error::DiskFull)))
    }
    assert_eq!(card.free_space(),free);
    assert_eq!(card.saves().expect("list failed").len(),0);
    assert!(card.check().expect("check failed").is_clean());
}

#[test]
fn remove_and_check() {
    let mut card = new_card(true);
    card.import(&make_save("FIRST","",&[4000]),false).expect("import failed");
    let free = card.free_space();
    card.import(&make_save("SECOND","",&[9000]),false).expect("import failed");
    card.remove("/SECOND").expect("remove failed");
    assert_eq!(card.free_space(),free);
    let report = card.check().expect("check failed");
    assert!(report.is_clean());
    assert_eq!(card.free_space(),free);
    match card.remove("/SECOND") {
        Ok(_) => panic!("removed twice"),
        Err(e) => assert!(matches!(err_kind(&e),Some(fs::Error::FileNotFound)))
    }
    match card.remove("/FIRST/data0") {
        Ok(_) => panic!("removed a file"),
        Err(e) => assert!(matches!(err_kind(&e),Some(fs::Error::NotADirectory)))
    }
    // freed slot is reused
    card.import(&make_save("THIRD","",&[1]),false).expect("import failed");
    let names: Vec<String> = card.saves().expect("list failed").into_iter().map(|e| e.name).collect();
    assert_eq!(names,vec!["FIRST","THIRD"]);
}

#[test]
fn check_repairs() {
    let mut card = new_card(false);
    card.import(&make_save("SAVE","",&[5000]),false).expect("import failed");
    let free = card.free_space();
    let mut dat = card.to_bytes().expect("writeback failed");
    // relative clusters: root 0, directory 1-2, icon.sys 3, data 4-8, root extension 9
    set_fat_entry(&mut dat,6,0x7fff_ffff);
    set_fat_entry(&mut dat,100,0xffff_ffff);
    let mut card = ps2kit::create_card_from_bytestream(dat).expect("reopen failed");
    match card.export("SAVE") {
        Ok(_) => panic!("broken chain was followed"),
        Err(e) => assert!(matches!(err_kind(&e),Some(fs::Error::BadFAT)))
    }
    let report = card.check().expect("check failed");
    assert!(!report.is_clean());
    assert_eq!(report.lost_clusters,3);
    assert_eq!(report.repairs.len(),2);
    assert_eq!(card.free_space(),free + 3*CLUSTER);
    let repaired = card.export("SAVE").expect("export failed");
    assert_eq!(repaired.get_file(1).expect("missing file").1.len(),2*CLUSTER);
    let again = card.check().expect("check failed");
    assert!(again.is_clean());
    assert_eq!(card.free_space(),free + 3*CLUSTER);
}

#[test]
fn geometry_mismatch() {
    let geom = Geometry::standard(names::CARD_16M,false).expect("bad geometry");
    let mut dat = Card::format(geom).expect("format failed").close().expect("close failed").into_bytes();
    // clusters_per_card
    dat[48..52].copy_from_slice(&u32::to_le_bytes(8192));
    match ps2kit::create_card_from_bytestream(dat.clone()) {
        Ok(_) => panic!("mismatch not detected"),
        Err(e) => assert!(matches!(err_kind(&e),Some(fs::Error::GeometryMismatch)))
    }
    dat[0] = b'X';
    match ps2kit::create_card_from_bytestream(dat) {
        Ok(_) => panic!("bad magic accepted"),
        Err(e) => assert!(matches!(err_kind(&e),Some(fs::Error::NotFormatted)))
    }
}

#[test]
fn ecc_conversion() {
    let mut card = new_card(true);
    let save = make_save("SAVE","",&[7000]);
    card.import(&save,false).expect("import failed");
    let img = card.close().expect("close failed");
    let orig = img.to_bytes();
    let stripped = img.convert_ecc(false).expect("strip failed");
    assert_eq!(stripped.geometry().image_len(),8*1024*1024);
    let card = Card::open(CardImage::from_bytestream(stripped.to_bytes()).expect("bad image")).expect("open failed");
    assert_eq!(card.export("SAVE").expect("export failed"),save);
    let restored = stripped.convert_ecc(true).expect("add failed");
    assert_eq!(restored.to_bytes(),orig);
}

#[test]
fn containers_through_card() {
    let reg = Registry::new();
    let mut card = new_card(true);
    let save = make_save("BESLES-12345GAME","Title",&[10,20000]);
    card.import(&save,false).expect("import failed");
    for tag in [FormatTag::Cbs,FormatTag::Psu] {
        let dat = reg.encode(tag,&card.export("BESLES-12345GAME").expect("export failed")).expect("encode failed");
        assert_eq!(reg.detect(&dat),Some(tag));
        let decoded = reg.decode(tag,&dat).expect("decode failed");
        let mut other = new_card(false);
        other.import(&decoded,false).expect("import failed");
        assert_eq!(other.export("BESLES-12345GAME").expect("export failed"),save);
    }
}
