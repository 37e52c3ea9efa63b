//! Pitch names, MIDI numbers and frequencies.

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Rendered in place of a name when a pitch falls outside the MIDI range.
pub const INVALID_NOTE: &str = "InvalidNote";

/// `60` -> `"C4"`. Octave is `floor(pitch / 12) - 1`.
pub fn note_name(pitch: u8) -> String {
    if pitch > 127 {
        return INVALID_NOTE.to_string();
    }
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

/// Parses `<A-G>[#]<octave>` with a single-digit, optionally negative,
/// octave. Returns the MIDI number, which may exceed 127 for `G#9`..`B9`.
pub fn parse_note_name(name: &str) -> Option<i32> {
    let letter_len = if name.get(1..2) == Some("#") { 2 } else { 1 };
    let (class, octave) = name.split_at_checked(letter_len)?;
    let semitone = NOTE_NAMES.iter().position(|n| *n == class)? as i32;

    let digits = octave.strip_prefix('-').unwrap_or(octave);
    if digits.len() != 1 || !digits.as_bytes()[0].is_ascii_digit() {
        return None;
    }
    let octave: i32 = octave.parse().ok()?;

    Some(12 * (octave + 1) + semitone)
}

pub fn midi_to_freq(pitch: i32) -> f64 {
    440.0 * 2.0_f64.powf((pitch as f64 - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_middle_c_and_extremes() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(127), "G9");
    }

    #[test]
    fn out_of_range_pitch_is_marked_invalid() {
        assert_eq!(note_name(128), INVALID_NOTE);
        assert_eq!(note_name(255), INVALID_NOTE);
    }

    #[test]
    fn parses_names_back_to_pitches() {
        assert_eq!(parse_note_name("C4"), Some(60));
        assert_eq!(parse_note_name("A4"), Some(69));
        assert_eq!(parse_note_name("D#5"), Some(75));
        assert_eq!(parse_note_name("C-1"), Some(0));
        assert_eq!(parse_note_name("B9"), Some(131));
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["", "H4", "C", "C10", "c4", "C#", "Db4", "C4x", "@", "0", "InvalidNote"] {
            assert_eq!(parse_note_name(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn every_valid_pitch_survives_a_name_round_trip() {
        for pitch in 0..=127u8 {
            assert_eq!(parse_note_name(&note_name(pitch)), Some(pitch as i32));
        }
    }

    #[test]
    fn concert_a_is_440() {
        assert!((midi_to_freq(69) - 440.0).abs() < 1e-9);
        assert!((midi_to_freq(81) - 880.0).abs() < 1e-9);
        assert!((midi_to_freq(60) - 261.6256).abs() < 1e-3);
    }
}
