//! Emotion registry and acoustic attribute types
//!
//! Emotions are a fixed enumeration stored by their three-letter code.
//! Each carries a default center in (energy, valence, danceability) space
//! that seeds every user's per-emotion model.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Acoustic position of a song or of a user's taste for an emotion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub energy: f64,
    pub valence: f64,
    pub danceability: f64,
}

impl Attributes {
    pub const fn new(energy: f64, valence: f64, danceability: f64) -> Self {
        Self {
            energy,
            valence,
            danceability,
        }
    }

    /// Reject any attribute outside [0, 1] (NaN included)
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("energy", self.energy),
            ("valence", self.valence),
            ("danceability", self.danceability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidInput(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Value on a single strategy axis
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Energy => self.energy,
            Axis::Valence => self.valence,
            Axis::Danceability => self.danceability,
        }
    }

    /// Arithmetic mean of a set of positions, `None` when empty
    pub fn mean<'a, I>(items: I) -> Option<Attributes>
    where
        I: IntoIterator<Item = &'a Attributes>,
    {
        let mut count = 0usize;
        let mut sum = Attributes::new(0.0, 0.0, 0.0);
        for item in items {
            sum.energy += item.energy;
            sum.valence += item.valence;
            sum.danceability += item.danceability;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(Attributes::new(
            sum.energy / n,
            sum.valence / n,
            sum.danceability / n,
        ))
    }

    /// Two-decimal rounding used for persistence
    pub fn rounded(&self) -> Attributes {
        Attributes::new(
            crate::time::round2(self.energy),
            crate::time::round2(self.valence),
            crate::time::round2(self.danceability),
        )
    }

    /// Replace zero (unset) attributes with the given defaults
    pub fn or_defaults(&self, defaults: &Attributes) -> Attributes {
        let pick = |value: f64, fallback: f64| if value == 0.0 { fallback } else { value };
        Attributes::new(
            pick(self.energy, defaults.energy),
            pick(self.valence, defaults.valence),
            pick(self.danceability, defaults.danceability),
        )
    }
}

/// Axis along which a browse jitter window is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Energy,
    Valence,
    Danceability,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Energy, Axis::Valence, Axis::Danceability];

    /// Column name in the `songs` table
    pub fn column(&self) -> &'static str {
        match self {
            Axis::Energy => "energy",
            Axis::Valence => "valence",
            Axis::Danceability => "danceability",
        }
    }
}

/// The fixed set of emotions a user can browse and vote for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    #[serde(rename = "MEL")]
    Melancholy,
    #[serde(rename = "CLM")]
    Calm,
    #[serde(rename = "HPY")]
    Happy,
    #[serde(rename = "EXC")]
    Excited,
}

impl Emotion {
    pub const ALL: [Emotion; 4] = [
        Emotion::Melancholy,
        Emotion::Calm,
        Emotion::Happy,
        Emotion::Excited,
    ];

    /// Three-letter storage code
    pub fn code(&self) -> &'static str {
        match self {
            Emotion::Melancholy => "MEL",
            Emotion::Calm => "CLM",
            Emotion::Happy => "HPY",
            Emotion::Excited => "EXC",
        }
    }

    /// Human readable name
    pub fn full_name(&self) -> &'static str {
        match self {
            Emotion::Melancholy => "Melancholy",
            Emotion::Calm => "Calm",
            Emotion::Happy => "Happy",
            Emotion::Excited => "Excited",
        }
    }

    /// Default center seeded into the `emotions` table
    pub fn default_attributes(&self) -> Attributes {
        match self {
            Emotion::Melancholy => Attributes::new(0.25, 0.25, 0.30),
            Emotion::Calm => Attributes::new(0.25, 0.75, 0.40),
            Emotion::Happy => Attributes::new(0.50, 0.75, 0.60),
            Emotion::Excited => Attributes::new(0.75, 0.50, 0.70),
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Emotion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Emotion::ALL
            .into_iter()
            .find(|e| e.code() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown emotion: {}", s)))
    }
}

/// Listening situation attached to a vote. The empty context is stored as ''.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VoteContext {
    #[default]
    #[serde(rename = "")]
    Unspecified,
    #[serde(rename = "PARTY")]
    Party,
    #[serde(rename = "RELAX")]
    Relax,
    #[serde(rename = "WORK")]
    Work,
    #[serde(rename = "EXERCISE")]
    Exercise,
    #[serde(rename = "OTHER")]
    Other,
}

impl VoteContext {
    pub const ALL: [VoteContext; 6] = [
        VoteContext::Unspecified,
        VoteContext::Party,
        VoteContext::Relax,
        VoteContext::Work,
        VoteContext::Exercise,
        VoteContext::Other,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            VoteContext::Unspecified => "",
            VoteContext::Party => "PARTY",
            VoteContext::Relax => "RELAX",
            VoteContext::Work => "WORK",
            VoteContext::Exercise => "EXERCISE",
            VoteContext::Other => "OTHER",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            VoteContext::Unspecified => "-----------",
            VoteContext::Party => "Party",
            VoteContext::Relax => "Relaxing",
            VoteContext::Work => "Work or Studying",
            VoteContext::Exercise => "Exercising",
            VoteContext::Other => "Other",
        }
    }
}

impl fmt::Display for VoteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for VoteContext {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        VoteContext::ALL
            .into_iter()
            .find(|c| c.code() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown context: {}", s)))
    }
}
