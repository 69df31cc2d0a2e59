use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use std::process::Command; // Run programs
use ps2kit::fs::DirEntry;
use ps2kit::fs::types::{CANONICAL_DIR_MODE,DEFAULT_FILE_MODE};
use ps2kit::save::{SaveFile,FormatTag};

type DYNERR = Box<dyn std::error::Error>;

fn write_test_save(path: &std::path::Path,name: &str,tag: FormatTag) -> Result<(),DYNERR> {
    let mut sf = SaveFile::new();
    let icon = ps2kit::fs::icon_sys::build("Cli","Test","icon.ico");
    sf.set_file(0,DirEntry::new("icon.sys",DEFAULT_FILE_MODE,icon.len() as u32),icon)?;
    sf.set_file(1,DirEntry::new("data",DEFAULT_FILE_MODE,3000),vec![0x5a;3000])?;
    sf.set_directory(DirEntry::new(name,CANONICAL_DIR_MODE,2));
    ps2kit::write_save_file(&path.to_string_lossy(),Some(tag),&sf)
}

#[test]
fn mkcard_and_df() -> Result<(),DYNERR> {
    let dir = tempfile::tempdir()?;
    let card = dir.path().join("card.ps2");
    Command::cargo_bin("ps2kit")?
        .arg("mkcard").arg("-d").arg(&card)
        .assert()
        .success();
    assert_eq!(std::fs::metadata(&card)?.len(),16384*528);
    Command::cargo_bin("ps2kit")?
        .arg("df").arg("-d").arg(&card)
        .assert()
        .success()
        .stdout(predicate::str::contains("8134 KB free"))
        .stdout(predicate::str::contains("8134 KB allocatable"));
    // refuses to clobber
    Command::cargo_bin("ps2kit")?
        .arg("mkcard").arg("-d").arg(&card)
        .assert()
        .failure();
    Ok(())
}

#[test]
fn stat_json() -> Result<(),DYNERR> {
    let dir = tempfile::tempdir()?;
    let card = dir.path().join("card.bin");
    Command::cargo_bin("ps2kit")?
        .arg("mkcard").arg("-d").arg(&card).arg("--no-ecc").arg("-s").arg("16")
        .assert()
        .success();
    assert_eq!(std::fs::metadata(&card)?.len(),16*1024*1024);
    Command::cargo_bin("ps2kit")?
        .arg("stat").arg("-d").arg(&card)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"clusters_per_card\":{\"_raw\":\"00400000\",\"_pretty\":16384}"))
        .stdout(predicate::str::contains("\"card_flags\":\"0x52\""));
    Ok(())
}

#[test]
fn import_export_delete() -> Result<(),DYNERR> {
    let dir = tempfile::tempdir()?;
    let card = dir.path().join("card.ps2");
    let cbs = dir.path().join("game.cbs");
    let psu = dir.path().join("other.psu");
    write_test_save(&cbs,"BASLUS-20001GAME",FormatTag::Cbs)?;
    write_test_save(&psu,"BESLES-50000OTHER",FormatTag::Psu)?;
    Command::cargo_bin("ps2kit")?
        .arg("mkcard").arg("-d").arg(&card)
        .assert()
        .success();
    Command::cargo_bin("ps2kit")?
        .arg("import").arg("-d").arg(&card).arg(&cbs).arg(&psu)
        .assert()
        .success();
    Command::cargo_bin("ps2kit")?
        .arg("import").arg("-d").arg(&card).arg(&cbs)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    Command::cargo_bin("ps2kit")?
        .arg("import").arg("-d").arg(&card).arg("-o").arg(&cbs)
        .assert()
        .success();
    Command::cargo_bin("ps2kit")?
        .arg("ls").arg("-d").arg(&card)
        .assert()
        .success()
        .stdout(predicate::str::contains("BASLUS-20001GAME"))
        .stdout(predicate::str::contains("Cli Test"));
    Command::cargo_bin("ps2kit")?
        .arg("ls").arg("-d").arg(&card).arg("-f").arg("BESLES-50000OTHER")
        .assert()
        .success()
        .stdout(predicate::str::contains("icon.sys"))
        .stdout(predicate::str::contains("3000"));
    let out = dir.path().join("out");
    std::fs::create_dir(&out)?;
    Command::cargo_bin("ps2kit")?
        .arg("export").arg("-d").arg(&card).arg("--dir").arg(&out).arg("-l").arg("-t").arg("cbs").arg("BASLUS-*")
        .assert()
        .success();
    let names: Vec<String> = std::fs::read_dir(&out)?.filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().to_string()).collect();
    assert_eq!(names.len(),1);
    assert!(names[0].starts_with("SLUS-20001 Cli Test ("));
    assert!(names[0].ends_with(").cbs"));
    let (tag,sf) = ps2kit::read_save_file(&out.join(&names[0]).to_string_lossy())?;
    assert_eq!(tag,FormatTag::Cbs);
    assert_eq!(sf.get_file(1).expect("missing file").1,vec![0x5a;3000]);
    Command::cargo_bin("ps2kit")?
        .arg("export").arg("-d").arg(&card).arg("--dir").arg(&out).arg("NOTHING*")
        .assert()
        .failure();
    Command::cargo_bin("ps2kit")?
        .arg("delete").arg("-d").arg(&card).arg("BASLUS-20001GAME")
        .assert()
        .success();
    Command::cargo_bin("ps2kit")?
        .arg("check").arg("-d").arg(&card)
        .assert()
        .success()
        .stdout(predicate::str::contains("no problems found"));
    Command::cargo_bin("ps2kit")?
        .arg("ls").arg("-d").arg(&card)
        .assert()
        .success()
        .stdout(predicate::str::contains("BASLUS-20001GAME").not());
    Ok(())
}

#[test]
fn strip_and_add_ecc() -> Result<(),DYNERR> {
    let dir = tempfile::tempdir()?;
    let card = dir.path().join("card.ps2");
    let bin = dir.path().join("card.bin");
    Command::cargo_bin("ps2kit")?
        .arg("mkcard").arg("-d").arg(&card)
        .assert()
        .success();
    Command::cargo_bin("ps2kit")?
        .arg("ecc").arg("--strip").arg("-d").arg(&card).arg("-o").arg(&bin)
        .assert()
        .success();
    assert_eq!(std::fs::metadata(&bin)?.len(),8*1024*1024);
    Command::cargo_bin("ps2kit")?
        .arg("ecc").arg("--add").arg("-d").arg(&bin)
        .assert()
        .success();
    assert_eq!(std::fs::read(&bin)?,std::fs::read(&card)?);
    Command::cargo_bin("ps2kit")?
        .arg("ecc").arg("-d").arg(&bin)
        .assert()
        .failure();
    Ok(())
}

#[test]
fn completions() -> Result<(),DYNERR> {
    Command::cargo_bin("ps2kit")?
        .arg("completions").arg("-s").arg("bash")
        .assert()
        .success()
        .stdout(predicate::str::contains("ps2kit"));
    Ok(())
}
