use std::fmt;
use std::str::FromStr;

use crate::error::TitleIdError;

const CONTENT_MASK: u64 = 0xFFF;
const UPDATE_SUFFIX: u64 = 0x800;
const DLC_BIT: u64 = 0x1000;

/// 64-bit title identifier, written as 16 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TitleId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TitleKind {
    Base,
    Update,
    Dlc,
}

impl TitleId {
    pub const fn new(raw: u64) -> Self {
        TitleId(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn kind(self) -> TitleKind {
        match self.0 & CONTENT_MASK {
            UPDATE_SUFFIX => TitleKind::Update,
            0 if self.0 & DLC_BIT == 0 => TitleKind::Base,
            _ => TitleKind::Dlc,
        }
    }

    /// The base application this id belongs to. Base ids map to themselves.
    pub fn base(self) -> TitleId {
        match self.kind() {
            TitleKind::Base => self,
            TitleKind::Update => TitleId(self.0 & !CONTENT_MASK),
            TitleKind::Dlc => TitleId((self.0 & !CONTENT_MASK) ^ DLC_BIT),
        }
    }
}

impl FromStr for TitleId {
    type Err = TitleIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 16 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TitleIdError(s.to_string()));
        }
        u64::from_str_radix(trimmed, 16)
            .map(TitleId)
            .map_err(|_| TitleIdError(s.to_string()))
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl fmt::Display for TitleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TitleKind::Base => "BASE",
            TitleKind::Update => "UPD",
            TitleKind::Dlc => "DLC",
        };
        f.write_str(label)
    }
}
