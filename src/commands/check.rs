use clap;
use log::info;
use crate::STDRESULT;

pub fn check(cmd: &clap::ArgMatches) -> STDRESULT {
    let path_to_img = cmd.get_one::<String>("dimg").expect("dimg is required");
    let mut card = crate::create_card_from_file(path_to_img)?;
    let report = card.check()?;
    println!("{}",report);
    if !report.is_clean() {
        info!("writing repaired image");
        crate::save_card(&mut card,path_to_img)?;
    }
    Ok(())
}

pub fn ecc(cmd: &clap::ArgMatches) -> STDRESULT {
    let path_to_img = cmd.get_one::<String>("dimg").expect("dimg is required");
    let out_path = cmd.get_one::<String>("output").unwrap_or(path_to_img);
    let img = crate::img::CardImage::from_bytestream(std::fs::read(path_to_img)?)?;
    let with_ecc = cmd.get_flag("add");
    if img.geometry().has_ecc()==with_ecc {
        log::warn!("image already {} ECC",match with_ecc { true => "has", false => "lacks" });
    }
    let converted = img.convert_ecc(with_ecc)?;
    std::fs::write(out_path,converted.into_bytes())?;
    Ok(())
}
