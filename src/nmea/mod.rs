//! NMEA-0183 lexer: checksum validation, field tokenization and the two
//! numeric conversions every sentence handler needs.
//!
//! Grounded on `nmea0183tomqtt.c`'s `nmea_is_valid_sentence`, `nmea_tok`,
//! `nmea_deg_to_double` and `nmea_strtod`.

pub mod sentences;

/// A validated, checksum-stripped NMEA sentence, ready for tokenization.
#[derive(Debug)]
pub struct Sentence<'a> {
    pub talker: String,
    pub code: String,
    fields: std::str::Split<'a, char>,
}

impl<'a> Sentence<'a> {
    /// Validate `line` (no trailing newline) and split it into talker/code
    /// plus a field cursor. Returns `None` for an empty line, a missing
    /// leading `$`, a missing/incomplete checksum, or a checksum mismatch
    /// (each of the latter two logs a warning at the call site via the
    /// caller checking `None` and logging, matching the original's
    /// warn-and-drop policy).
    pub fn parse(line: &'a str) -> Result<Option<Self>, ChecksumError> {
        if line.is_empty() {
            return Ok(None);
        }
        let body = match line.strip_prefix('$') {
            Some(b) => b,
            None => return Err(ChecksumError::MissingDollar),
        };
        let star = match body.find('*') {
            Some(i) => i,
            None => return Err(ChecksumError::MissingChecksum),
        };
        let (sum_body, rest) = body.split_at(star);
        let hex = &rest[1..];
        let hex = hex.get(0..2).ok_or(ChecksumError::MissingChecksum)?;
        let expected =
            u8::from_str_radix(hex, 16).map_err(|_| ChecksumError::MissingChecksum)?;
        let actual = sum_body.bytes().fold(0u8, |acc, b| acc ^ b);
        if actual != expected {
            return Err(ChecksumError::Mismatch);
        }

        let mut fields = sum_body.split(',');
        let head = fields.next().unwrap_or("");
        if head.len() <= 2 {
            return Ok(None);
        }
        let (talker, code) = head.split_at(2);
        Ok(Some(Sentence {
            talker: talker.to_ascii_lowercase(),
            code: code.to_ascii_uppercase(),
            fields,
        }))
    }

    /// Next field, or `""` if the sentence has no more fields (mirrors
    /// `nmea_safe_tok`).
    pub fn tok(&mut self) -> &'a str {
        self.fields.next().unwrap_or("")
    }

    /// Next field, or `None` at end of sentence (mirrors `nmea_tok`, used
    /// where the caller distinguishes "absent" from "present but empty",
    /// e.g. the optional GSA packet number).
    pub fn tok_opt(&mut self) -> Option<&'a str> {
        self.fields.next()
    }

    /// Skip one field.
    pub fn skip(&mut self) {
        self.fields.next();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumError {
    MissingDollar,
    MissingChecksum,
    Mismatch,
}

/// Parse a decimal field as `f64`; empty field is NaN (locale-independent
/// decimal point, per `nmea_strtod`).
pub fn to_double(s: &str) -> f64 {
    if s.is_empty() {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

/// Parse `DDDMM.MMMM...` into decimal degrees (unsigned; the caller applies
/// the hemisphere sign). Empty field is NaN. Mirrors
/// `nmea_deg_to_double`: the integer part left of the decimal point is
/// split into whole degrees (every 100) and the leading two digits of
/// minutes; the fractional remainder is added to the minutes before
/// dividing by 60.
pub fn nmea_deg(s: &str) -> f64 {
    if s.is_empty() {
        return f64::NAN;
    }
    let (int_part, frac_part) = match s.find('.') {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    };
    let lval: i64 = int_part.parse().unwrap_or(0);
    let frac: f64 = if frac_part.is_empty() {
        0.0
    } else {
        frac_part.parse().unwrap_or(0.0)
    };
    let deg = lval / 100;
    let min_frac = (lval % 100) as f64 + frac;
    deg as f64 + min_frac / 60.0
}

/// Apply a hemisphere letter ('S' or 'W' negate, anything else leaves
/// unsigned).
pub fn apply_hemisphere(value: f64, hemi: &str) -> f64 {
    if hemi == "S" || hemi == "W" {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_talker_and_code() {
        let s = Sentence::parse("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47")
            .unwrap()
            .unwrap();
        assert_eq!(s.talker, "gp");
        assert_eq!(s.code, "GGA");
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let err = Sentence::parse("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*00")
            .unwrap_err();
        assert_eq!(err, ChecksumError::Mismatch);
    }

    #[test]
    fn missing_dollar_is_rejected() {
        let err = Sentence::parse("GPGGA,1,2*00").unwrap_err();
        assert_eq!(err, ChecksumError::MissingDollar);
    }

    #[test]
    fn empty_line_is_ignored_silently() {
        assert!(Sentence::parse("").unwrap().is_none());
    }

    #[test]
    fn deg_conversion_matches_known_fix() {
        let v = nmea_deg("4807.038");
        assert!((v - 48.1173).abs() < 1e-4, "{v}");
    }

    #[test]
    fn deg_empty_is_nan() {
        assert!(nmea_deg("").is_nan());
    }

    #[test]
    fn deg_without_decimal_point_degrades_gracefully() {
        let v = nmea_deg("4807");
        assert!((v - 48.1167).abs() < 1e-3, "{v}");
    }

    #[test]
    fn to_double_empty_is_nan() {
        assert!(to_double("").is_nan());
    }

    #[test]
    fn hemisphere_negates_south_and_west() {
        assert_eq!(apply_hemisphere(1.0, "S"), -1.0);
        assert_eq!(apply_hemisphere(1.0, "W"), -1.0);
        assert_eq!(apply_hemisphere(1.0, "N"), 1.0);
        assert_eq!(apply_hemisphere(1.0, "E"), 1.0);
    }

    #[test]
    fn tok_after_end_is_empty_string() {
        let line = "$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K*48";
        let mut s = Sentence::parse(line).unwrap().unwrap();
        for _ in 0..7 {
            s.tok();
        }
        assert_eq!(s.tok(), "010.2");
        assert_eq!(s.tok(), "K");
        assert_eq!(s.tok(), "");
        assert_eq!(s.tok_opt(), None);
    }
}
