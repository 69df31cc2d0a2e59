//! # `ps2kit` main library
//! 
//! This library manipulates PS2 memory card images, and the single-save container files
//! that other tools use to move saves on and off a card.
//! 
//! ## Architecture
//! 
//! Card operations are built around three objects:
//! * `img::CardImage` holds the raw pages, with or without ECC, and does not interpret them
//! * `fs::Card` imposes the memory card file system on the image
//! * `save::SaveFile` is one save directory with its files, detached from any card
//! 
//! When a `Card` object is created it takes ownership of some `CardImage`.
//! It then uses this owned image as storage.  Any changes are not permanent until the
//! image is saved to whatever file system is hosting ps2kit.
//! 
//! ## Card Images
//! 
//! Images are raw dumps of the card's flash, 8, 16, 32, or 64 MB, either with the ECC spare
//! area following each page (as dumped from the card) or without it.  The geometry is
//! inferred from the length of the image.
//! 
//! ## Save Containers
//! 
//! As of this writing `ps2kit` supports
//! * CodeBreaker (`.cbs`)
//! * EMS adapter (`.psu`)

pub mod img;
pub mod fs;
pub mod save;
pub mod commands;

use log::info;

type DYNERR = Box<dyn std::error::Error>;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Save the card image file (make changes permanent)
pub fn save_card(card: &mut fs::Card,img_path: &str) -> STDRESULT {
    std::fs::write(img_path,card.to_bytes()?)?;
    Ok(())
}

/// Given a bytestream return a card, or Err if the bytestream cannot be interpreted.
/// The card takes ownership of the image.
pub fn create_card_from_bytestream(card_img_data: Vec<u8>) -> Result<fs::Card,DYNERR> {
    let img = img::CardImage::from_bytestream(card_img_data)?;
    info!("image geometry {}",img.geometry());
    fs::Card::open(img)
}

/// Calls `create_card_from_bytestream` getting the bytes from a file.
pub fn create_card_from_file(img_path: &str) -> Result<fs::Card,DYNERR> {
    match std::fs::read(img_path) {
        Ok(card_img_data) => create_card_from_bytestream(card_img_data),
        Err(e) => Err(Box::new(e))
    }
}

/// Read a save container, identifying the format from its content.
pub fn read_save_file(path: &str) -> Result<(save::FormatTag,save::SaveFile),DYNERR> {
    let dat = std::fs::read(path)?;
    let reg = save::Registry::new();
    match reg.detect(&dat) {
        Some(tag) => Ok((tag,reg.decode(tag,&dat)?)),
        None => {
            log::error!("{} is not a recognized save file",path);
            Err(Box::new(save::Error::UnknownFormat))
        }
    }
}

/// Write a save container.  If `tag` is None the format follows the file extension.
pub fn write_save_file(path: &str,tag: Option<save::FormatTag>,save_file: &save::SaveFile) -> STDRESULT {
    let reg = save::Registry::new();
    let tag = match tag {
        Some(t) => t,
        None => reg.for_filename(path)
    };
    std::fs::write(path,reg.encode(tag,save_file)?)?;
    Ok(())
}
