//! Teleinfo line decoder
//!
//! The meter emits one labelled field per line. Five labels matter here; each
//! has a fixed layout measured from where the label starts in the line:
//!
//! | label   | fields                                  |
//! |---------|-----------------------------------------|
//! | `IINST` | phase at +5, amperes at +7..+10         |
//! | `ADIR`  | phase at +4, amperes at +6..+9          |
//! | `HCHP`  | standard-tariff index at +5..+15        |
//! | `HCHC`  | savings-tariff index at +5..+15         |
//! | `PAPP`  | apparent power at +5..+10               |
//!
//! Anything else is ignored.

pub mod reader;

use crate::error::{HeatshedError, Result};
use serde::{Deserialize, Serialize};

/// Tariff period of a cumulative meter index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TariffPeriod {
    /// Peak hours (HCHP)
    Standard,
    /// Off-peak hours (HCHC)
    Savings,
}

/// A decoded teleinfo field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Instantaneous current on a phase; `overload` for the over-current warning
    Current {
        phase: u8,
        amperes: u32,
        overload: bool,
    },
    /// Cumulative meter index (Wh)
    Meter { period: TariffPeriod, value: u64 },
    /// Apparent power (VA) and the instant it was decoded
    Power { timestamp: f64, watts: u32 },
}

const IINST: &str = "IINST";
const ADIR: &str = "ADIR";
const HCHP: &str = "HCHP";
const HCHC: &str = "HCHC";
const PAPP: &str = "PAPP";

/// Fixed-width field `[from, to)` of `line`, clipped to its end and trimmed
fn field<'a>(line: &'a str, from: usize, to: usize, label: &str) -> Result<&'a str> {
    let end = to.min(line.len());
    let raw = line
        .get(from..end)
        .filter(|_| from < end)
        .ok_or_else(|| HeatshedError::protocol(format!("{}: missing field", label)))?;
    let value = raw.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HeatshedError::protocol(format!(
            "{}: malformed field '{}'",
            label, raw
        )));
    }
    Ok(value)
}

fn parse_phase(line: &str, at: usize, label: &str) -> Result<u8> {
    let phase: u8 = field(line, at, at + 1, label)?.parse()?;
    if !(1..=3).contains(&phase) {
        return Err(HeatshedError::invalid_phase(i64::from(phase)));
    }
    Ok(phase)
}

/// Decode one line. `Ok(None)` when no known label is present.
pub fn decode_line(line: &str, now_secs: f64) -> Result<Option<Reading>> {
    if let Some(pos) = line.find(IINST) {
        let phase = parse_phase(line, pos + 5, IINST)?;
        let amperes = field(line, pos + 7, pos + 10, IINST)?.parse()?;
        return Ok(Some(Reading::Current {
            phase,
            amperes,
            overload: false,
        }));
    }

    if let Some(pos) = line.find(ADIR) {
        let phase = parse_phase(line, pos + 4, ADIR)?;
        let amperes = field(line, pos + 6, pos + 9, ADIR)?.parse()?;
        return Ok(Some(Reading::Current {
            phase,
            amperes,
            overload: true,
        }));
    }

    if let Some(pos) = line.find(HCHP) {
        let value = field(line, pos + 5, pos + 15, HCHP)?.parse()?;
        return Ok(Some(Reading::Meter {
            period: TariffPeriod::Standard,
            value,
        }));
    }

    if let Some(pos) = line.find(HCHC) {
        let value = field(line, pos + 5, pos + 15, HCHC)?.parse()?;
        return Ok(Some(Reading::Meter {
            period: TariffPeriod::Savings,
            value,
        }));
    }

    if let Some(pos) = line.find(PAPP) {
        let watts = field(line, pos + 5, pos + 10, PAPP)?.parse()?;
        return Ok(Some(Reading::Power {
            timestamp: now_secs,
            watts,
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_instantaneous_current() {
        assert_eq!(
            decode_line("IINST1 025 X", 0.0).unwrap(),
            Some(Reading::Current {
                phase: 1,
                amperes: 25,
                overload: false
            })
        );
        assert_eq!(
            decode_line("IINST3 002", 0.0).unwrap(),
            Some(Reading::Current {
                phase: 3,
                amperes: 2,
                overload: false
            })
        );
    }

    #[test]
    fn field_borrows_from_the_line_only() {
        let line = String::from("IINST1 012 J");
        let value = {
            let label = format!("{}{}", IINST, 1);
            field(&line, 7, 10, &label).unwrap()
        };
        assert_eq!(value, "012");
        assert!(field(&line, 7, 7, "IINST1").is_err());
        assert!(field(&line, 11, 14, "IINST1").is_err());
    }

    #[test]
    fn fields_are_relative_to_label() {
        assert_eq!(
            decode_line("\u{2}IINST2 031 ?", 0.0).unwrap(),
            Some(Reading::Current {
                phase: 2,
                amperes: 31,
                overload: false
            })
        );
    }

    #[test]
    fn decodes_overload_warning() {
        assert_eq!(
            decode_line("ADIR2 045 Z", 0.0).unwrap(),
            Some(Reading::Current {
                phase: 2,
                amperes: 45,
                overload: true
            })
        );
    }

    #[test]
    fn decodes_meter_indexes() {
        assert_eq!(
            decode_line("HCHP 012345678 ]", 0.0).unwrap(),
            Some(Reading::Meter {
                period: TariffPeriod::Standard,
                value: 12_345_678
            })
        );
        assert_eq!(
            decode_line("HCHC 000004321 (", 0.0).unwrap(),
            Some(Reading::Meter {
                period: TariffPeriod::Savings,
                value: 4_321
            })
        );
    }

    #[test]
    fn decodes_power_with_timestamp() {
        assert_eq!(
            decode_line("PAPP 02350 +", 1234.5).unwrap(),
            Some(Reading::Power {
                timestamp: 1234.5,
                watts: 2350
            })
        );
    }

    #[test]
    fn unknown_labels_yield_nothing() {
        assert_eq!(decode_line("ADCO 012345678901 E", 0.0).unwrap(), None);
        assert_eq!(decode_line("", 0.0).unwrap(), None);
        assert_eq!(decode_line("OPTARIF HC.. <", 0.0).unwrap(), None);
    }

    #[test]
    fn malformed_fields_fail_the_line() {
        assert!(matches!(
            decode_line("IINST1 0A5", 0.0),
            Err(HeatshedError::Protocol { .. })
        ));
        assert!(matches!(
            decode_line("IINST 025 X", 0.0),
            Err(HeatshedError::Protocol { .. })
        ));
        assert!(decode_line("PAPP", 0.0).is_err());
        assert!(decode_line("HCHP ", 0.0).is_err());
    }

    #[test]
    fn out_of_range_phase_fails_the_line() {
        assert!(matches!(
            decode_line("IINST4 010", 0.0),
            Err(HeatshedError::InvalidPhase { phase: 4 })
        ));
        assert!(decode_line("ADIR0 040", 0.0).is_err());
    }
}
