use std::collections::HashMap;
use std::io;
use std::str::FromStr;

use crate::{fourcc_str, Error, FourCC, FullBoxHeader, Result};

/// Detail levels for box descriptions.
///
/// Parsed from strings like `"all:1,trun:2"`: `all` sets the default level,
/// other entries override it for one box type. Level 0 prints only the box
/// title, 1 adds the box fields, 2 and up adds per-entry details (samples,
/// references).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoLevels {
    default: u32,
    per_box: HashMap<[u8; 4], u32>,
}

impl InfoLevels {
    pub fn all(level: u32) -> Self {
        InfoLevels {
            default: level,
            per_box: HashMap::new(),
        }
    }

    pub fn with_box(mut self, name: [u8; 4], level: u32) -> Self {
        self.per_box.insert(name, level);
        self
    }

    pub fn level_for(&self, name: &FourCC) -> u32 {
        self.per_box.get(&name.0).copied().unwrap_or(self.default)
    }
}

impl FromStr for InfoLevels {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut levels = InfoLevels::default();

        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let invalid = || Error::InvalidInfoLevels(entry.to_string());

            let (name, level) = entry.split_once(':').ok_or_else(invalid)?;
            let level: u32 = level.trim().parse().map_err(|_| invalid())?;

            if name == "all" {
                levels.default = level;
                continue;
            }

            if name.is_empty() || name.len() > 4 || !name.is_ascii() {
                return Err(invalid());
            }

            // short names such as "url" are space padded
            let mut key = [b' '; 4];
            key[..name.len()].copy_from_slice(name.as_bytes());
            levels.per_box.insert(key, level);
        }

        Ok(levels)
    }
}

pub(crate) fn write_title<W: io::Write + ?Sized>(
    w: &mut W,
    name: &FourCC,
    size: u64,
    full_box_header: Option<FullBoxHeader>,
    indent: &str,
) -> Result<()> {
    write!(w, "{}[{}] size={}", indent, fourcc_str(name), size)?;

    if let Some(header) = full_box_header {
        write!(w, " version={} flags={:06x}", header.version(), header.flags())?;
    }

    writeln!(w)?;

    Ok(())
}

pub(crate) fn write_field<W: io::Write + ?Sized>(
    w: &mut W,
    indent: &str,
    key: &str,
    value: impl std::fmt::Display,
) -> Result<()> {
    writeln!(w, "{} - {}: {}", indent, key, value)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_and_overrides() {
        let levels: InfoLevels = "all:1, trun:2,url:0".parse().unwrap();

        assert_eq!(levels.level_for(&FourCC(*b"moof")), 1);
        assert_eq!(levels.level_for(&FourCC(*b"trun")), 2);
        assert_eq!(levels.level_for(&FourCC(*b"url ")), 0);
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!("trun".parse::<InfoLevels>().is_err());
        assert!("trun:x".parse::<InfoLevels>().is_err());
        assert!("toolong:1".parse::<InfoLevels>().is_err());
        assert_eq!("".parse::<InfoLevels>().unwrap(), InfoLevels::all(0));
    }
}
