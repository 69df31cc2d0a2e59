use clap;
use log::info;
use crate::img::{CardImage,names,geometry::Geometry};
use crate::fs::Card;
use super::CommandError;
use crate::STDRESULT;

pub fn mkcard(cmd: &clap::ArgMatches) -> STDRESULT {
    let path_to_img = cmd.get_one::<String>("dimg").expect("dimg is required");
    let mult = match cmd.get_one::<String>("size").map(|s| s.as_str()) {
        Some("8") | None => names::CARD_8M,
        Some("16") => names::CARD_16M,
        Some("32") => names::CARD_32M,
        Some("64") => names::CARD_64M,
        Some(_) => return Err(Box::new(CommandError::OutOfRange))
    };
    if std::path::Path::new(path_to_img).exists() {
        log::error!("refusing to overwrite {}",path_to_img);
        return Err(Box::new(CommandError::InvalidCommand));
    }
    let geom = Geometry::standard(mult,!cmd.get_flag("no-ecc"))?;
    let img: CardImage = Card::format(geom)?.close()?;
    info!("writing {} byte image",geom.image_len());
    std::fs::write(path_to_img,img.into_bytes())?;
    Ok(())
}
