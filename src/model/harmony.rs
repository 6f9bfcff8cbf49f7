// Chord symbols, including the explicit "no chord" marker
//
// Parsing accepts the usual lead-sheet spellings: C, Am, G7, Dm7, F#maj7,
// Bbdim, Esus4, and NC / N.C. for no chord.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for chord symbol parsing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChordParseError {
    #[error("Empty chord symbol")]
    Empty,

    #[error("Invalid root note in chord symbol: {0}")]
    InvalidRoot(String),

    #[error("Unknown chord quality: {0}")]
    UnknownQuality(String),
}

/// Chord quality, defining the intervals above the root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    Major,
    Minor,
    Dominant7,
    Major7,
    Minor7,
    Diminished,
    Augmented,
    Sus4,
    Sus2,
}

impl ChordQuality {
    /// Semitone intervals above the root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Dominant7 => &[0, 4, 7, 10],
            ChordQuality::Major7 => &[0, 4, 7, 11],
            ChordQuality::Minor7 => &[0, 3, 7, 10],
            ChordQuality::Diminished => &[0, 3, 6],
            ChordQuality::Augmented => &[0, 4, 8],
            ChordQuality::Sus4 => &[0, 5, 7],
            ChordQuality::Sus2 => &[0, 2, 7],
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Major7 => "maj7",
            ChordQuality::Minor7 => "m7",
            ChordQuality::Diminished => "dim",
            ChordQuality::Augmented => "aug",
            ChordQuality::Sus4 => "sus4",
            ChordQuality::Sus2 => "sus2",
        }
    }

    fn parse(suffix: &str) -> Option<Self> {
        let quality = match suffix {
            "" | "maj" | "M" => ChordQuality::Major,
            "m" | "min" | "-" => ChordQuality::Minor,
            "7" => ChordQuality::Dominant7,
            "maj7" | "M7" => ChordQuality::Major7,
            "m7" | "min7" | "-7" => ChordQuality::Minor7,
            "dim" | "°" => ChordQuality::Diminished,
            "aug" | "+" => ChordQuality::Augmented,
            "sus4" | "sus" => ChordQuality::Sus4,
            "sus2" => ChordQuality::Sus2,
            _ => return None,
        };
        Some(quality)
    }
}

/// Harmony at a point of the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChordSymbol {
    /// No pitched accompaniment should sound
    NoChord,
    Chord {
        /// Pitch class of the root, 0 = C
        root: u8,
        quality: ChordQuality,
    },
}

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B"];

impl ChordSymbol {
    pub fn chord(root: u8, quality: ChordQuality) -> Self {
        ChordSymbol::Chord { root: root % 12, quality }
    }

    pub fn is_no_chord(&self) -> bool {
        matches!(self, ChordSymbol::NoChord)
    }

    /// Chord tones stacked upward from the root in the octave starting at `base`
    /// (`base` should be a C, e.g. 48 for C3). Empty for NC.
    pub fn pitches(&self, base: u8) -> Vec<u8> {
        match self {
            ChordSymbol::NoChord => Vec::new(),
            ChordSymbol::Chord { root, quality } => quality
                .intervals()
                .iter()
                .map(|i| base.saturating_add(*root).saturating_add(*i).min(127))
                .collect(),
        }
    }

    /// Root pitch in the octave starting at `base`
    pub fn root_pitch(&self, base: u8) -> Option<u8> {
        match self {
            ChordSymbol::NoChord => None,
            ChordSymbol::Chord { root, .. } => Some(base.saturating_add(*root).min(127)),
        }
    }
}

impl FromStr for ChordSymbol {
    type Err = ChordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ChordParseError::Empty);
        }
        if s.eq_ignore_ascii_case("nc") || s.eq_ignore_ascii_case("n.c.") {
            return Ok(ChordSymbol::NoChord);
        }

        let mut chars = s.chars();
        let letter = chars.next().ok_or(ChordParseError::Empty)?;
        let natural: i8 = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(ChordParseError::InvalidRoot(s.to_string())),
        };

        let rest = &s[letter.len_utf8()..];
        let (accidental, suffix): (i8, &str) = if let Some(r) = rest.strip_prefix('#') {
            (1, r)
        } else if let Some(r) = rest.strip_prefix('b') {
            (-1, r)
        } else {
            (0, rest)
        };

        let quality = ChordQuality::parse(suffix)
            .ok_or_else(|| ChordParseError::UnknownQuality(suffix.to_string()))?;
        let root = (natural + accidental).rem_euclid(12) as u8;

        Ok(ChordSymbol::Chord { root, quality })
    }
}

impl fmt::Display for ChordSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChordSymbol::NoChord => f.write_str("NC"),
            ChordSymbol::Chord { root, quality } => {
                write!(f, "{}{}", NOTE_NAMES[(*root % 12) as usize], quality.suffix())
            }
        }
    }
}

/// A chord symbol placed on the timeline at `(bar, beat)`.
/// It lasts until the next chord event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordEvent {
    pub bar: u32,
    /// Beat inside the bar, from 0
    pub beat: f64,
    pub symbol: ChordSymbol,
}

impl ChordEvent {
    pub fn new(bar: u32, beat: f64, symbol: ChordSymbol) -> Self {
        Self { bar, beat: beat.max(0.0), symbol }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_symbols() {
        assert_eq!("C".parse::<ChordSymbol>().unwrap(), ChordSymbol::chord(0, ChordQuality::Major));
        assert_eq!("Am7".parse::<ChordSymbol>().unwrap(), ChordSymbol::chord(9, ChordQuality::Minor7));
        assert_eq!("F#dim".parse::<ChordSymbol>().unwrap(), ChordSymbol::chord(6, ChordQuality::Diminished));
        assert_eq!("Bb7".parse::<ChordSymbol>().unwrap(), ChordSymbol::chord(10, ChordQuality::Dominant7));
        assert_eq!("Cb".parse::<ChordSymbol>().unwrap(), ChordSymbol::chord(11, ChordQuality::Major));
        assert_eq!("NC".parse::<ChordSymbol>().unwrap(), ChordSymbol::NoChord);
        assert_eq!("n.c.".parse::<ChordSymbol>().unwrap(), ChordSymbol::NoChord);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<ChordSymbol>(), Err(ChordParseError::Empty));
        assert!(matches!("H7".parse::<ChordSymbol>(), Err(ChordParseError::InvalidRoot(_))));
        assert!(matches!("Cwhat".parse::<ChordSymbol>(), Err(ChordParseError::UnknownQuality(_))));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for text in ["C", "Ebm", "G7", "Amaj7", "Dm7", "Bdim", "Faug", "Gsus4", "NC"] {
            let chord: ChordSymbol = text.parse().unwrap();
            assert_eq!(chord.to_string().parse::<ChordSymbol>().unwrap(), chord);
        }
    }

    #[test]
    fn test_pitches() {
        let g7: ChordSymbol = "G7".parse().unwrap();
        assert_eq!(g7.pitches(48), vec![55, 59, 62, 65]);
        assert_eq!(g7.root_pitch(36), Some(43));
        assert!(ChordSymbol::NoChord.pitches(48).is_empty());
    }
}
