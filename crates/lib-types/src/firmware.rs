//! Firmware version information.
//!
//! The card reports three 32-bit words: a packed version tag, the git SHA-1
//! prefix of the firmware build, and a BCD-coded build date.

use serde::{Deserialize, Serialize};

/// Firmware identification as reported by the card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Packed version word.
    pub version: u32,

    /// Short git SHA-1 of the firmware source.
    pub git_sha1: u32,

    /// BCD-coded build date (`0xYYMMDDxx`).
    pub build_timestamp: u32,

    /// Human-readable description returned by the library.
    pub description: String,
}

impl FirmwareVersion {
    /// Build from the raw words, deriving the description locally.
    pub fn from_words(version: u32, git_sha1: u32, build_timestamp: u32) -> Self {
        let mut fw = Self {
            version,
            git_sha1,
            build_timestamp,
            description: String::new(),
        };
        fw.description = fw.describe();
        fw
    }

    #[inline]
    pub fn tag_major(&self) -> u32 {
        (self.version >> 8) & 0xff
    }

    #[inline]
    pub fn tag_minor(&self) -> u32 {
        self.version & 0xff
    }

    /// Commits since the last tag.
    #[inline]
    pub fn commits_since_tag(&self) -> u32 {
        (self.version >> 16) & 0xfff
    }

    /// Built from a working tree with uncommitted changes.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        (self.version >> 28) & 0xf == 0xd
    }

    /// Build date as `(yy, mm, dd)` BCD bytes.
    pub fn build_date_bcd(&self) -> (u32, u32, u32) {
        let ts = self.build_timestamp;
        ((ts >> 24) & 0xff, (ts >> 16) & 0xff, (ts >> 8) & 0xff)
    }

    /// Format the version the same way the driver does,
    /// e.g. `v1.4-12-g1a2b3c4-dirty 2016-12-1`.
    pub fn describe(&self) -> String {
        let mut s = format!("v{}.{}", self.tag_major(), self.tag_minor());
        let commits = self.commits_since_tag();
        if commits > 0 {
            s.push_str(&format!("-{}-g{:x}", commits, self.git_sha1));
        }
        if self.is_dirty() {
            s.push_str("-dirty");
        }
        // BCD digits print correctly in hex
        let (yy, mm, dd) = self.build_date_bcd();
        s.push_str(&format!(" 20{yy:x}-{mm:x}-{dd:x}"));
        s
    }
}
