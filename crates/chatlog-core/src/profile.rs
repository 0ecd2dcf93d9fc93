//! Viewport profiles.
//!
//! A profile names one of a fixed set of browser window sizes. It governs the
//! viewport (and therefore recording resolution) of a run, and it also acts as
//! a routing key: a target chat may pin itself to a single profile.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// One of the three supported viewport profiles.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
  Small,
  #[default]
  Medium,
  Large,
}

impl Profile {
  pub const ALL: [Profile; 3] = [Profile::Small, Profile::Medium, Profile::Large];

  pub fn as_str(self) -> &'static str {
    match self {
      Profile::Small => "small",
      Profile::Medium => "medium",
      Profile::Large => "large",
    }
  }

  /// The built-in window size for this profile.
  pub fn default_viewport(self) -> Viewport {
    match self {
      Profile::Small => Viewport { width: 1280, height: 720 },
      Profile::Medium => Viewport { width: 1600, height: 900 },
      Profile::Large => Viewport { width: 1920, height: 1080 },
    }
  }
}

impl fmt::Display for Profile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Profile {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "small" => Ok(Profile::Small),
      "medium" => Ok(Profile::Medium),
      "large" => Ok(Profile::Large),
      _ => Err(Error::UnknownProfile(s.to_owned())),
    }
  }
}

/// Browser window dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
  pub width:  u32,
  pub height: u32,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_case_insensitively() {
    assert_eq!("Large".parse::<Profile>().unwrap(), Profile::Large);
    assert_eq!(" small ".parse::<Profile>().unwrap(), Profile::Small);
  }

  #[test]
  fn rejects_unknown_profile() {
    let err = "huge".parse::<Profile>().unwrap_err();
    assert!(matches!(err, Error::UnknownProfile(name) if name == "huge"));
  }

  #[test]
  fn default_is_medium() {
    assert_eq!(Profile::default(), Profile::Medium);
    assert_eq!(Profile::Medium.default_viewport().width, 1600);
  }
}
