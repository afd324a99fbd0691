//! Key labels and the semitone offset between two keys.
//!
//! Labels follow the annotation format `"<pitch>:<mode>"`, e.g. `"C:maj"` or
//! `"Eb:min"`. Only the pitch part is used.

use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

/// A spelled pitch name such as `C`, `F#` or `Bb`.
///
/// The chromatic value keeps the spelling's octave offset: `Cb` is -1 and `B#`
/// is 12. Use [`PitchName::pitch_class`] for the value reduced to 0..12.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchName {
    natural: i32,
    accidentals: i32,
}

impl PitchName {
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.trim().chars();
        let natural = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let mut accidentals = 0;
        for c in chars {
            accidentals += match c {
                '#' | '♯' => 1,
                'b' | '♭' => -1,
                _ => return None,
            };
        }
        Some(Self {
            natural,
            accidentals,
        })
    }

    pub fn chroma(&self) -> i32 {
        self.natural + self.accidentals
    }

    pub fn pitch_class(&self) -> u8 {
        self.chroma().rem_euclid(12) as u8
    }
}

/// Tonic and mode of a recording, as written in the key annotation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLabel {
    tonic: PitchName,
    mode: Option<String>,
    raw: String,
}

impl KeyLabel {
    pub fn parse(label: &str) -> Result<Self> {
        let (pitch, mode) = match label.split_once(':') {
            Some((pitch, mode)) => (pitch, Some(mode.trim().to_string())),
            None => (label, None),
        };
        let tonic = PitchName::parse(pitch).ok_or_else(|| Error::Parse {
            label: label.to_string(),
        })?;
        Ok(Self {
            tonic,
            mode,
            raw: label.trim().to_string(),
        })
    }

    pub fn tonic(&self) -> PitchName {
        self.tonic
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }
}

impl FromStr for KeyLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// How a raw semitone difference is folded before it is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetWrap {
    /// Apply the difference as computed, up to ±11 (or more for odd spellings).
    #[default]
    None,
    /// Fold into -6..=5, the smallest shift reaching the same pitch class.
    Nearest,
}

impl OffsetWrap {
    pub fn apply(self, semitones: i32) -> i32 {
        match self {
            OffsetWrap::None => semitones,
            OffsetWrap::Nearest => (semitones + 6).rem_euclid(12) - 6,
        }
    }
}

/// Semitones that move a recording in key `from` into key `to`.
///
/// Positive means raise. No octave wraparound is applied: `C` to `B` is +11.
pub fn semitone_difference(from: &KeyLabel, to: &KeyLabel) -> i32 {
    to.tonic.chroma() - from.tonic.chroma()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: [&str; 17] = [
        "C", "C#", "Db", "D", "D#", "Eb", "E", "F", "F#", "Gb", "G", "G#", "Ab", "A", "A#", "Bb",
        "B",
    ];

    fn key(s: &str) -> KeyLabel {
        KeyLabel::parse(s).unwrap()
    }

    #[test]
    fn parse_label_with_mode() {
        let k = key("Eb:min");
        assert_eq!(k.tonic().pitch_class(), 3);
        assert_eq!(k.mode(), Some("min"));
        assert_eq!(k.to_string(), "Eb:min");
    }

    #[test]
    fn parse_bare_pitch() {
        let k = key("f#");
        assert_eq!(k.tonic().pitch_class(), 6);
        assert_eq!(k.mode(), None);
    }

    #[test]
    fn enharmonic_spellings_share_a_pitch_class() {
        assert_eq!(key("Db:maj").tonic().pitch_class(), key("C#:maj").tonic().pitch_class());
        assert_eq!(key("Cb:maj").tonic().pitch_class(), key("B:maj").tonic().pitch_class());
        assert_eq!(key("Cb:maj").tonic().chroma(), -1);
        assert_eq!(key("B#:maj").tonic().chroma(), 12);
    }

    #[test]
    fn rejects_unknown_pitch_names() {
        for label in ["H:maj", "", ":maj", "Cx:min", "C-:maj"] {
            assert!(
                matches!(KeyLabel::parse(label), Err(Error::Parse { .. })),
                "{label}"
            );
        }
    }

    #[test]
    fn same_key_is_zero() {
        for name in NAMES {
            let k = key(&format!("{name}:maj"));
            assert_eq!(semitone_difference(&k, &k), 0);
        }
    }

    #[test]
    fn difference_is_antisymmetric() {
        for a in NAMES {
            for b in NAMES {
                let (a, b) = (key(a), key(b));
                assert_eq!(semitone_difference(&a, &b), -semitone_difference(&b, &a));
            }
        }
    }

    #[test]
    fn difference_direction_and_no_wraparound() {
        assert_eq!(semitone_difference(&key("C:maj"), &key("D:maj")), 2);
        assert_eq!(semitone_difference(&key("D:maj"), &key("C:maj")), -2);
        assert_eq!(semitone_difference(&key("C:maj"), &key("B:min")), 11);
        assert_eq!(semitone_difference(&key("B:min"), &key("C:maj")), -11);
    }

    #[test]
    fn nearest_wrap_folds_into_half_octave() {
        assert_eq!(OffsetWrap::Nearest.apply(11), -1);
        assert_eq!(OffsetWrap::Nearest.apply(-11), 1);
        assert_eq!(OffsetWrap::Nearest.apply(5), 5);
        assert_eq!(OffsetWrap::Nearest.apply(6), -6);
        assert_eq!(OffsetWrap::Nearest.apply(-6), -6);
        assert_eq!(OffsetWrap::Nearest.apply(0), 0);
        assert_eq!(OffsetWrap::None.apply(11), 11);
    }
}
