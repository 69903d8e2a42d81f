//! Bar resolution (timeframe).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Supported bar resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Resolution {
    pub fn minutes(self) -> u32 {
        match self {
            Resolution::M1 => 1,
            Resolution::M5 => 5,
            Resolution::M15 => 15,
            Resolution::M30 => 30,
            Resolution::H1 => 60,
            Resolution::H4 => 240,
            Resolution::D1 => 1440,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::M1 => "1m",
            Resolution::M5 => "5m",
            Resolution::M15 => "15m",
            Resolution::M30 => "30m",
            Resolution::H1 => "1h",
            Resolution::H4 => "4h",
            Resolution::D1 => "1d",
        }
    }

    /// Number of `self` bars per `higher` bar, if `higher` is an exact multiple.
    pub fn ratio_to(self, higher: Resolution) -> Option<usize> {
        let (lo, hi) = (self.minutes(), higher.minutes());
        if hi >= lo && hi % lo == 0 {
            Some((hi / lo) as usize)
        } else {
            None
        }
    }
}

impl FromStr for Resolution {
    type Err = ConfigError;

    /// Lenient parsing: `5m`, `m5`, `1h`, `h1`, `60` (one hour) and bare
    /// `1|5|15|30` (minutes) are all accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_ascii_lowercase();
        let canonical = match raw.as_str() {
            "60" => "1h".to_string(),
            "1" | "5" | "15" | "30" => format!("{raw}m"),
            _ => match raw.chars().next() {
                Some(unit @ ('m' | 'h' | 'd'))
                    if raw.len() > 1 && raw[1..].chars().all(|c| c.is_ascii_digit()) =>
                {
                    format!("{}{unit}", &raw[1..])
                }
                _ => raw.clone(),
            },
        };
        match canonical.as_str() {
            "1m" => Ok(Resolution::M1),
            "5m" => Ok(Resolution::M5),
            "15m" => Ok(Resolution::M15),
            "30m" => Ok(Resolution::M30),
            "1h" => Ok(Resolution::H1),
            "4h" => Ok(Resolution::H4),
            "1d" => Ok(Resolution::D1),
            _ => Err(ConfigError::InvalidResolution(s.to_string())),
        }
    }
}

impl TryFrom<String> for Resolution {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
