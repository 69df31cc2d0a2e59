use clap;
use colored::*;
use crate::fs::{tod,Card};
use crate::STDRESULT;

fn list_saves(card: &Card) -> STDRESULT {
    println!("{:32} {:>6} {:16} {}","NAME".bold(),"KB".bold(),"MODIFIED".bold(),"TITLE".bold());
    for save in card.saves()? {
        let path = format!("/{}",save.name);
        let kb = card.entry_footprint(&path)? / 1024;
        let title = match card.read_icon_metadata(&path) {
            Ok(Some(icon)) => icon.title_line(),
            Ok(None) => String::new(),
            Err(e) => {
                log::warn!("{}: {}",save.name,e);
                String::new()
            }
        };
        let name = match save.is_psx() {
            true => save.name.yellow(),
            false => save.name.blue().bold()
        };
        println!("{:32} {:>6} {:16} {}",name,kb,tod::to_string(&save.modified),title);
    }
    println!();
    println!("{} KB free",card.free_space()/1024);
    Ok(())
}

fn list_files(card: &Card,save: &str) -> STDRESULT {
    let path = format!("/{}",save.trim_matches('/'));
    println!("{:6} {:32} {:>8} {:16}","MODE".bold(),"NAME".bold(),"LENGTH".bold(),"MODIFIED".bold());
    for ent in card.list(&path)? {
        let ent = ent?;
        let name = match ent.is_dir() {
            true => ent.name.blue().bold(),
            false => ent.name.normal()
        };
        println!("{:6} {:32} {:>8} {:16}",ent.mode_string(),name,ent.length,tod::to_string(&ent.modified));
    }
    Ok(())
}

pub fn catalog(cmd: &clap::ArgMatches) -> STDRESULT {
    let path_to_img = cmd.get_one::<String>("dimg").expect("dimg is required");
    let card = crate::create_card_from_file(path_to_img)?;
    match cmd.get_one::<String>("save") {
        Some(save) => list_files(&card,save),
        None => list_saves(&card)
    }
}

pub fn df(cmd: &clap::ArgMatches) -> STDRESULT {
    let path_to_img = cmd.get_one::<String>("dimg").expect("dimg is required");
    let card = crate::create_card_from_file(path_to_img)?;
    println!("{}",card.geometry());
    println!("{:>8} KB free",card.free_space()/1024);
    println!("{:>8} KB allocatable",card.allocatable_space()/1024);
    Ok(())
}

pub fn stat(cmd: &clap::ArgMatches) -> STDRESULT {
    let path_to_img = cmd.get_one::<String>("dimg").expect("dimg is required");
    let card = crate::create_card_from_file(path_to_img)?;
    println!("{}",card.stat(cmd.get_one::<u16>("indent").copied()));
    Ok(())
}
