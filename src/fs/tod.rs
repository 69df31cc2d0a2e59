//! ### Time of day
//! 
//! Directory entries carry timestamps as 8 bytes: a reserved byte, seconds, minutes, hours,
//! day, month, and a 16 bit year.  The console keeps Japan Standard Time (UTC+9)
//! regardless of where it was sold, so that is how the calendar value is interpreted.
//! 
//! A timestamp that is all zero, that does not form a valid date, or that lands exactly on
//! the epoch is treated as unset.

use chrono::{Datelike,Duration,NaiveDate,NaiveDateTime,Timelike};

/// offset of the card's clock from UTC
const JST_OFFSET_HOURS: i64 = 9;

fn is_epoch(t: &NaiveDateTime) -> bool {
    t.year()==1970 && t.ordinal()==1 && t.hour()==JST_OFFSET_HOURS as u32 && t.minute()==0 && t.second()==0
}

/// Interpret the packed timestamp, `None` means unset.
pub fn unpack(tod: &[u8;8]) -> Option<NaiveDateTime> {
    let year = u16::from_le_bytes([tod[6],tod[7]]) as i32;
    let date = NaiveDate::from_ymd_opt(year,tod[5] as u32,tod[4] as u32)?;
    let time = date.and_hms_opt(tod[3] as u32,tod[2] as u32,tod[1] as u32)?;
    match is_epoch(&time) {
        true => None,
        false => Some(time)
    }
}

/// Pack a calendar value, fractional seconds are dropped.
pub fn pack(time: &NaiveDateTime) -> [u8;8] {
    let year = u16::to_le_bytes(time.year() as u16);
    [
        0,
        time.second() as u8,
        time.minute() as u8,
        time.hour() as u8,
        time.day() as u8,
        time.month() as u8,
        year[0],
        year[1]
    ]
}

/// Current time on the card's clock, to the nearest second below.
pub fn now() -> NaiveDateTime {
    let t = chrono::Utc::now().naive_utc() + Duration::hours(JST_OFFSET_HOURS);
    t.with_nanosecond(0).unwrap_or(t)
}

/// Interpret the packed timestamp, substituting the current time if it is unset.
pub fn unpack_or_now(tod: &[u8;8]) -> NaiveDateTime {
    match unpack(tod) {
        Some(t) => t,
        None => now()
    }
}

/// Display form used in listings
pub fn to_string(time: &NaiveDateTime) -> String {
    time.format("%Y-%m-%d %H:%M").to_string()
}

#[test]
fn round_trip_now() {
    let t = now();
    assert_eq!(unpack(&pack(&t)),Some(t));
}

#[test]
fn unset_timestamps() {
    assert_eq!(unpack(&[0;8]),None);
    // month 13
    assert_eq!(unpack(&[0,0,0,0,1,13,0xd0,0x07]),None);
    // 1970-01-01 09:00:00 JST is the epoch
    assert_eq!(unpack(&[0,0,0,9,1,1,0xb2,0x07]),None);
    let t = unpack(&[0,30,15,12,24,12,0xd6,0x07]).expect("valid date");
    assert_eq!(to_string(&t),"2006-12-24 12:15");
    assert_eq!(t.second(),30);
}
