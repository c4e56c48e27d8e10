//! Spawn report parsing: turns one chat message such as
//! `Dragonite 40.7128 -74.0060 98%` into a [`SpawnRecord`].
//!
//! There is no grammar.  Tokens are read left to right and each one fills
//! the first empty slot it fits (name → latitude → longitude); anything
//! that fits nowhere makes the whole message a candidate for an IV lookup.
pub mod creature_names;
pub mod iv;
pub mod lexicon;
pub mod noise;

use std::fmt;

use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::spawn::iv::extract_iv;
use crate::spawn::lexicon::{
    is_combined_coordinate, is_creature_name, is_lat_long, normalize_coordinate_token, title_case,
};
use crate::spawn::noise::is_noise;

/// Highest IV a report may carry; anything above marks the message as garbage.
pub const MAX_IV: u32 = 100;

/// A parsed sighting.  Coordinates are kept as the exact source strings so
/// that dedup compares what people typed, not what a float round-trips to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRecord {
    pub name: String,
    pub lat: String,
    pub lon: String,
    pub iv: Option<u8>,
}

impl fmt::Display for SpawnRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(iv) = self.iv {
            write!(f, " ({iv}%)")?;
        }
        write!(f, " at {}, {}", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Accepted(SpawnRecord),
    Rejected,
}

impl ParseOutcome {
    pub fn accepted(self) -> Option<SpawnRecord> {
        match self {
            Self::Accepted(record) => Some(record),
            Self::Rejected => None,
        }
    }
}

/// IV lookup over the whole message, computed at most once per message.
pub struct IvLookup<'a> {
    text: &'a str,
    cached: OnceCell<Option<u32>>,
}

impl<'a> IvLookup<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            cached: OnceCell::new(),
        }
    }

    fn get(&self) -> Option<u32> {
        *self.cached.get_or_init(|| extract_iv(self.text))
    }
}

/// Slot-filling state threaded through the token fold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slots {
    pub name: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub iv: Option<u8>,
}

impl Slots {
    /// Feed one token.  `None` aborts the whole message (IV above
    /// [`MAX_IV`]).
    pub fn step(mut self, token: &str, iv: &IvLookup<'_>) -> Option<Self> {
        let coord = normalize_coordinate_token(token);

        if self.name.is_none() && is_creature_name(token) {
            self.name = Some(title_case(token.trim()));
        } else if self.lat.is_none() && is_lat_long(&coord) {
            self.lat = Some(coord);
        } else if self.lat.is_some() && self.lon.is_none() && is_lat_long(&coord) {
            self.lon = Some(coord);
        } else if self.lat.is_none() && self.lon.is_none() && is_combined_coordinate(token) {
            let (lat, lon) = token.split_once(',')?;
            self.lat = Some(lat.to_string());
            self.lon = Some(lon.to_string());
        } else {
            match iv.get() {
                Some(v) if v > MAX_IV => {
                    debug!("IV {v} out of range – rejecting message");
                    return None;
                }
                // `v <= MAX_IV` here, so it fits in a u8.
                found => self.iv = found.map(|v| v as u8),
            }
        }
        Some(self)
    }

    /// The finished record, if name and both coordinates were found.
    pub fn finish(self) -> Option<SpawnRecord> {
        Some(SpawnRecord {
            name: self.name?,
            lat: self.lat?,
            lon: self.lon?,
            iv: self.iv,
        })
    }
}

/// Remove line breaks and tabs, then trim.
fn clean(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\t' | '\r' | '\n'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parse one chat message.  Never fails: anything that is not a complete
/// report comes back as [`ParseOutcome::Rejected`].
pub fn parse(text: &str) -> ParseOutcome {
    if is_noise(text) {
        debug!("Noise message – skipping");
        return ParseOutcome::Rejected;
    }

    let text = clean(text);
    let iv = IvLookup::new(&text);

    let record = text
        .split(' ')
        .try_fold(Slots::default(), |slots, token| slots.step(token.trim(), &iv))
        .and_then(Slots::finish);

    match record {
        Some(record) => ParseOutcome::Accepted(record),
        None => ParseOutcome::Rejected,
    }
}
