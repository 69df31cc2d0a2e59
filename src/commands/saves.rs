use clap;
use std::str::FromStr;
use std::path::Path;
use log::{info,warn,error};
use crate::save::{self,FormatTag,Registry};
use super::CommandError;
use crate::STDRESULT;

pub fn import(cmd: &clap::ArgMatches) -> STDRESULT {
    let path_to_img = cmd.get_one::<String>("dimg").expect("dimg is required");
    let overwrite = cmd.get_flag("overwrite");
    let mut card = crate::create_card_from_file(path_to_img)?;
    for path in cmd.get_many::<String>("paths").expect("paths are required") {
        let (tag,sf) = crate::read_save_file(path)?;
        info!("importing {} save {}",tag,sf.get_directory().name);
        if let Err(e) = card.import(&sf,overwrite) {
            error!("could not import {}",path);
            return Err(e);
        }
    }
    crate::save_card(&mut card,path_to_img)
}

pub fn export(cmd: &clap::ArgMatches) -> STDRESULT {
    let path_to_img = cmd.get_one::<String>("dimg").expect("dimg is required");
    let outdir = cmd.get_one::<String>("outdir").expect("outdir has a default");
    let reg = Registry::new();
    let tag = match cmd.get_one::<String>("type") {
        Some(t) => FormatTag::from_str(t)?,
        None => reg.primary()
    };
    let card = crate::create_card_from_file(path_to_img)?;
    let mut matchers = Vec::new();
    for pattern in cmd.get_many::<String>("patterns").expect("patterns are required") {
        matchers.push(globset::Glob::new(pattern)?.compile_matcher());
    }
    let mut count = 0;
    for ent in card.saves()? {
        if !matchers.iter().any(|m| m.is_match(&ent.name)) {
            continue;
        }
        let sf = card.export(&ent.name)?;
        let stem = match cmd.get_flag("longnames") {
            true => save::make_longname(&ent.name,&sf),
            false => save::fix_filename(&ent.name)
        };
        let out_path = Path::new(outdir).join(format!("{}.{}",stem,tag));
        if out_path.exists() {
            warn!("overwriting {}",out_path.display());
        }
        std::fs::write(&out_path,reg.encode(tag,&sf)?)?;
        println!("{} -> {}",ent.name,out_path.display());
        count += 1;
    }
    if count==0 {
        error!("no saves matched");
        return Err(Box::new(CommandError::FileNotFound));
    }
    Ok(())
}

pub fn delete(cmd: &clap::ArgMatches) -> STDRESULT {
    let path_to_img = cmd.get_one::<String>("dimg").expect("dimg is required");
    let mut card = crate::create_card_from_file(path_to_img)?;
    for name in cmd.get_many::<String>("saves").expect("saves are required") {
        card.remove(&format!("/{}",name.trim_matches('/')))?;
    }
    let report = card.check()?;
    if !report.is_clean() {
        warn!("{}",report);
    }
    crate::save_card(&mut card,path_to_img)
}
