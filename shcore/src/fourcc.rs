use std::fmt;
use std::str::FromStr;

use serde::de::{self, Unexpected, Visitor};
use serde::Deserialize;
use serde::Deserializer;
use thiserror::Error;

/// A raw four byte tag such as `DXBC`, `DXIL` or the `ZZZ4` blob marker.
///
/// Tags are compared byte for byte. They are usually ASCII but nothing here
/// requires it, non printable tags are displayed as hex.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FourCC(pub [u8; 4]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid tag {input:?}: expected 4 ASCII characters or 8 hex digits")]
pub struct ParseFourCCError {
    pub input: String,
}

impl FourCC {
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ')
    }

    /// File extension used for artifacts holding this chunk's payload.
    ///
    /// `DXIL` becomes `dxil`; tags that are not plain alphanumerics fall
    /// back to their hex spelling so the name is always filesystem safe.
    pub fn file_extension(&self) -> String {
        if self.0.iter().all(|b| b.is_ascii_alphanumeric()) {
            self.0.iter().map(|b| b.to_ascii_lowercase() as char).collect()
        } else {
            hex::encode(self.0)
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_printable() {
            for b in self.0 {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "0x{}", hex::encode(self.0))
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

impl FromStr for FourCC {
    type Err = ParseFourCCError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseFourCCError {
            input: s.to_string(),
        };

        if s.len() == 4 && s.is_ascii() {
            let bytes: [u8; 4] = s.as_bytes().try_into().map_err(|_| err())?;
            return Ok(FourCC(bytes));
        }

        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 4];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| err())?;
        Ok(FourCC(bytes))
    }
}

// Serde impls, a tag is spelled the same way as on the command line
struct FourCCVisitor;

impl<'de> Visitor<'de> for FourCCVisitor {
    type Value = FourCC;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a 4 character tag or 8 hex digits")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse()
            .map_err(|_| de::Error::invalid_value(Unexpected::Str(v), &self))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        v.try_into()
            .map(FourCC)
            .map_err(|_| de::Error::invalid_value(Unexpected::Bytes(v), &self))
    }
}

impl<'de> Deserialize<'de> for FourCC {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<FourCC, D::Error> {
        deserializer.deserialize_str(FourCCVisitor)
    }
}

#[cfg(test)]
mod test_fourcc {
    use super::*;

    #[test]
    fn display_ascii() {
        assert_eq!(FourCC(*b"DXIL").to_string(), "DXIL");
        assert_eq!(format!("{:?}", FourCC(*b"ZZZ4")), "FourCC(ZZZ4)");
    }

    #[test]
    fn display_binary() {
        assert_eq!(FourCC([0x42, 0x43, 0xc0, 0xde]).to_string(), "0x4243c0de");
    }

    #[test]
    fn parse_ascii() {
        assert_eq!("ILDB".parse::<FourCC>().unwrap(), FourCC(*b"ILDB"));
    }

    #[test]
    fn parse_hex() {
        assert_eq!("0x4243c0de".parse::<FourCC>().unwrap(), FourCC([0x42, 0x43, 0xc0, 0xde]));
        assert_eq!("44584243".parse::<FourCC>().unwrap(), FourCC(*b"DXBC"));
    }

    #[test]
    fn parse_rejects_other_lengths() {
        assert!("DXI".parse::<FourCC>().is_err());
        assert!("DXILL".parse::<FourCC>().is_err());
        assert!("0xzzzzzzzz".parse::<FourCC>().is_err());
    }

    #[test]
    fn case_is_preserved() {
        assert_ne!("dxil".parse::<FourCC>().unwrap(), FourCC(*b"DXIL"));
    }

    #[test]
    fn extension() {
        assert_eq!(FourCC(*b"DXIL").file_extension(), "dxil");
        assert_eq!(FourCC(*b"SFI0").file_extension(), "sfi0");
        assert_eq!(FourCC(*b"A B ").file_extension(), "41204220");
    }

    #[test]
    fn deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrap {
            tag: FourCC,
        }

        let w: Wrap = toml::from_str(r#"tag = "STAT""#).unwrap();
        assert_eq!(w.tag, FourCC(*b"STAT"));

        assert!(toml::from_str::<Wrap>(r#"tag = "TOOLONG""#).is_err());
    }
}
