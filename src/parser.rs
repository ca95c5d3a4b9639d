//! Parser for iotop's timestamped summary lines.
//!
//! These are pure functions that turn one line of `iotop -oqqtk` output
//! into a raw sample. They are designed to be easily testable with string
//! inputs.

use chrono::NaiveTime;

/// Marker identifying the summary line that carries actual throughput.
/// Per-process rows and the `Total DISK READ` summary do not contain it.
const READ_MARKER: &str = "Actual DISK READ";

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Fields extracted from a matching summary line, before timestamp
/// reconstruction and unit conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub time_of_day: NaiveTime,
    pub read_kb_per_sec: f64,
    pub write_kb_per_sec: f64,
}

/// Parses one line of iotop output.
///
/// Only the timestamped summary line is recognized:
///
/// ```text
/// 11:22:33 Actual DISK READ: 0.00 K/s | Actual DISK WRITE: 0.00 K/s
/// ```
///
/// Everything else (blank lines, per-process rows, other summaries) yields
/// `Ok(None)`. Field positions are fixed: token 0 is the time of day,
/// token 4 the read rate in KB/s, token 10 the write rate. A malformed
/// time or rate token on a matching line is an error, never a zero sample.
pub fn parse_line(line: &str) -> Result<Option<RawSample>, ParseError> {
    let line = line.trim();

    if !line.contains(READ_MARKER) {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 11 {
        return Err(ParseError::new(format!(
            "not enough fields in summary line: expected 11+, got {}",
            fields.len()
        )));
    }

    let time_of_day = NaiveTime::parse_from_str(fields[0], "%H:%M:%S")
        .map_err(|_| ParseError::new(format!("invalid time token '{}'", fields[0])))?;

    let read_kb_per_sec = parse_rate(fields[4], "read")?;
    let write_kb_per_sec = parse_rate(fields[10], "write")?;

    Ok(Some(RawSample {
        time_of_day,
        read_kb_per_sec,
        write_kb_per_sec,
    }))
}

fn parse_rate(token: &str, name: &str) -> Result<f64, ParseError> {
    token
        .parse()
        .map_err(|_| ParseError::new(format!("invalid {} rate '{}'", name, token)))
}

/// Converts a decimal-kilobytes-per-second rate to integral bits per
/// second, truncating toward zero.
pub fn to_bits_per_sec(kb_per_sec: f64) -> u64 {
    (kb_per_sec * 1000.0 * 8.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_matching_lines_yield_nothing() {
        let lines = [
            "",
            "   ",
            "Total DISK READ: 3.00 K/s | Total DISK WRITE: 0.00 K/s",
            "  TID  PRIO  USER     DISK READ  DISK WRITE  SWAPIN     IO>    COMMAND",
            "11:22:33  1234 be/4 root 0.00 K/s 12.00 K/s  0.00 %  0.10 % kworker/0:2",
            "garbage",
        ];
        for line in lines {
            assert_eq!(parse_line(line), Ok(None), "line: {:?}", line);
        }
    }

    #[test]
    fn matching_line_extracts_positional_fields() {
        let line = "11:22:33 Actual DISK READ: 1.50 K/s | Actual DISK WRITE: 2.00 K/s";
        let raw = parse_line(line).unwrap().unwrap();
        assert_eq!(
            raw.time_of_day,
            NaiveTime::from_hms_opt(11, 22, 33).unwrap()
        );
        assert_eq!(raw.read_kb_per_sec, 1.50);
        assert_eq!(raw.write_kb_per_sec, 2.00);
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let line = "  00:00:01 Actual DISK READ: 0.00 K/s | Actual DISK WRITE: 0.00 K/s\n";
        let raw = parse_line(line).unwrap().unwrap();
        assert_eq!(raw.time_of_day, NaiveTime::from_hms_opt(0, 0, 1).unwrap());
    }

    #[test]
    fn malformed_time_token_is_an_error() {
        let line = "99:99:99 Actual DISK READ: 1.50 K/s | Actual DISK WRITE: 2.00 K/s";
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn malformed_rate_token_is_an_error() {
        let bad_read = "11:22:33 Actual DISK READ: x.yz K/s | Actual DISK WRITE: 2.00 K/s";
        assert!(parse_line(bad_read).is_err());

        let bad_write = "11:22:33 Actual DISK READ: 1.50 K/s | Actual DISK WRITE: -- K/s";
        assert!(parse_line(bad_write).is_err());
    }

    #[test]
    fn truncated_matching_line_is_an_error() {
        assert!(parse_line("11:22:33 Actual DISK READ: 1.50 K/s |").is_err());
    }

    #[test]
    fn conversion_truncates_toward_zero() {
        assert_eq!(to_bits_per_sec(0.0), 0);
        assert_eq!(to_bits_per_sec(1.50), 12000);
        assert_eq!(to_bits_per_sec(2.00), 16000);
        assert_eq!(to_bits_per_sec(12.34), 98720);
        assert_eq!(to_bits_per_sec(0.29), 2320);
    }
}
