//! Rule log parser for reconciliation driver logs
//!
//! Each line that names a rule (`Rule [<name>]`) becomes one [`RuleMetric`]. Counts,
//! match percentage and elapsed time are picked up wherever they appear on the line;
//! a field that is missing or does not parse stays `None`. The optional leading
//! `dd/MM/yy HH:mm:ss` timestamp is local time in the configured zone.

use crate::services::run_analyzer::models::RuleMetric;
use crate::services::run_analyzer::parser::error::{ParseError, ParseResult};
use chrono::{FixedOffset, LocalResult, NaiveDateTime, Offset, TimeDelta};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

static RULE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"Rule\s*\[(?<rule>[^\]]+)]").unwrap());

static COUNT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?<key>Match Candidates|Matches from ageing breaks|Matches|Total Unmatched)\s*=\s*(?<val>\d+)",
    )
    .unwrap()
});

static MATCH_PCT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Total Match %\s*=\s*(?<val>[0-9.]+)%").unwrap());

static MATCH_TIME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"MatchTime\s*=\s*(?<val>[0-9.]+)s").unwrap());

static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?<dt>\d{2}/\d{2}/\d{2}\s+\d{2}:\d{2}:\d{2})\s+").unwrap()
});

const TIMESTAMP_FORMAT: &str = "%d/%m/%y %H:%M:%S";

/// Zone the rule log's local timestamps are written in
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogTimezone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl Default for LogTimezone {
    fn default() -> Self {
        Self::Named(Tz::Asia__Kolkata)
    }
}

impl fmt::Display for LogTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(offset) => write!(f, "{}", offset),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl LogTimezone {
    /// Epoch millis of a local wall-clock time.
    ///
    /// An ambiguous time (clocks going back) resolves to the earlier instant. A time
    /// inside a DST gap is read with the offset in effect before the gap, which moves
    /// it forward by the gap length.
    pub fn local_to_epoch_ms(&self, naive: NaiveDateTime) -> Option<i64> {
        match self {
            Self::Fixed(offset) => naive.and_local_timezone(*offset).single().map(|dt| dt.timestamp_millis()),
            Self::Named(tz) => match naive.and_local_timezone(*tz) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.timestamp_millis()),
                LocalResult::None => {
                    let before = naive
                        .checked_sub_signed(TimeDelta::hours(24))?
                        .and_local_timezone(*tz)
                        .earliest()?;
                    let offset_ms = i64::from(before.offset().fix().local_minus_utc()) * 1000;
                    Some(naive.and_utc().timestamp_millis() - offset_ms)
                },
            },
        }
    }
}

/// Parse a rule log timezone.
///
/// Accepts `UTC`/`Z`, fixed offsets (`+HH:MM`, `-HH:MM`, `+HHMM`, `-HHMM`) and IANA
/// names such as `Asia/Kolkata` or `America/New_York`.
pub fn parse_timezone(tz: &str) -> ParseResult<LogTimezone> {
    let invalid = || ParseError::InvalidTimezone(tz.to_string());
    let s = tz.trim();

    if s.eq_ignore_ascii_case("utc") || s.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0).map(LogTimezone::Fixed).ok_or_else(invalid);
    }

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return s.parse::<Tz>().map(LogTimezone::Named).map_err(|_| invalid()),
    };

    let digits: String = match rest.as_bytes() {
        [h1, h2, b':', m1, m2] | [h1, h2, m1, m2] => [*h1, *h2, *m1, *m2].iter().map(|&b| b as char).collect(),
        _ => return Err(invalid()),
    };
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .map(LogTimezone::Fixed)
        .ok_or_else(invalid)
}

/// Extracts rule metrics from reconciliation driver logs
#[derive(Debug, Clone)]
pub struct RuleLogParser {
    timezone: LogTimezone,
}

impl RuleLogParser {
    pub fn new(timezone: LogTimezone) -> Self {
        Self { timezone }
    }

    /// Parse one line; `None` when the line carries no rule marker.
    pub fn parse_line(&self, line: &str) -> Option<RuleMetric> {
        let rule = RULE_REGEX.captures(line)?.name("rule")?.as_str().trim().to_string();

        let mut metric = RuleMetric { rule, ..Default::default() };

        for caps in COUNT_REGEX.captures_iter(line) {
            let value = caps["val"].parse::<u64>().ok();
            match &caps["key"] {
                "Match Candidates" => metric.match_candidates = value,
                "Matches from ageing breaks" => metric.matches_from_ageing_breaks = value,
                "Matches" => metric.matches = value,
                "Total Unmatched" => metric.total_unmatched = value,
                _ => {},
            }
        }

        metric.total_match_pct = Self::float_capture(&MATCH_PCT_REGEX, line);
        metric.match_time_sec = Self::float_capture(&MATCH_TIME_REGEX, line);
        metric.end_timestamp_ms = self.timestamp_ms(line);

        Some(metric)
    }

    fn float_capture(regex: &Regex, line: &str) -> Option<f64> {
        regex
            .captures(line)
            .and_then(|caps| caps["val"].parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    fn timestamp_ms(&self, line: &str) -> Option<i64> {
        let caps = TIMESTAMP_REGEX.captures(line)?;
        let naive = NaiveDateTime::parse_from_str(&caps["dt"], TIMESTAMP_FORMAT).ok()?;
        self.timezone.local_to_epoch_ms(naive)
    }

    pub fn parse_str(&self, text: &str) -> Vec<RuleMetric> {
        text.lines().filter_map(|line| self.parse_line(line)).collect()
    }

    /// Parse a rule log; lines that are not valid UTF-8 are decoded lossily.
    pub fn parse_reader<R: BufRead>(&self, mut reader: R) -> io::Result<Vec<RuleMetric>> {
        let mut rules = Vec::new();
        let mut buf = Vec::new();

        while reader.read_until(b'\n', &mut buf)? > 0 {
            if let Some(metric) = self.parse_line(&String::from_utf8_lossy(&buf)) {
                rules.push(metric);
            }
            buf.clear();
        }

        Ok(rules)
    }

    pub fn parse_path(&self, path: &Path) -> ParseResult<Vec<RuleMetric>> {
        let file = File::open(path)
            .map_err(|source| ParseError::Open { path: path.to_path_buf(), source })?;
        let rules = self
            .parse_reader(BufReader::new(file))
            .map_err(|source| ParseError::Read { path: path.to_path_buf(), source })?;

        tracing::info!(
            "Parsed rule log {} ({}): {} rule executions",
            path.display(),
            self.timezone,
            rules.len()
        );
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> RuleLogParser {
        RuleLogParser::new(parse_timezone("UTC").unwrap())
    }

    #[test]
    fn test_full_line() {
        let line = "05/03/24 10:15:30 INFO Recon: Rule [R1_amount_exact] Match Candidates = 1200, \
                    Matches = 900, Matches from ageing breaks = 15, Total Unmatched = 300, \
                    Total Match % = 75.00%, MatchTime = 12.5s";
        let m = utc().parse_line(line).unwrap();
        assert_eq!(m.rule, "R1_amount_exact");
        assert_eq!(m.match_candidates, Some(1200));
        assert_eq!(m.matches, Some(900));
        assert_eq!(m.matches_from_ageing_breaks, Some(15));
        assert_eq!(m.total_unmatched, Some(300));
        assert_eq!(m.total_match_pct, Some(75.0));
        assert_eq!(m.match_time_sec, Some(12.5));
        // 2024-03-05T10:15:30Z
        assert_eq!(m.end_timestamp_ms, Some(1_709_633_730_000));
    }

    #[test]
    fn test_offset_applied() {
        let ist = RuleLogParser::new(parse_timezone("+05:30").unwrap());
        let m = ist.parse_line("05/03/24 10:15:30 Rule [R] MatchTime = 1s").unwrap();
        assert_eq!(m.end_timestamp_ms, Some(1_709_633_730_000 - 19_800_000));
    }

    #[test]
    fn test_partial_line() {
        let m = utc().parse_line("Rule [ R2 ] Matches = 7").unwrap();
        assert_eq!(m.rule, "R2");
        assert_eq!(m.matches, Some(7));
        assert_eq!(m.match_candidates, None);
        assert_eq!(m.match_time_sec, None);
        assert_eq!(m.end_timestamp_ms, None);
    }

    #[test]
    fn test_lines_without_rule_are_skipped() {
        assert!(utc().parse_line("Matches = 7 MatchTime = 3s").is_none());
        let text = "starting\nRule [A] MatchTime = 1.5s\n\nRule [B] Matches = 1\n";
        let rules = utc().parse_str(text);
        assert_eq!(rules.iter().map(|r| r.rule.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_unparsable_values_are_absent() {
        let m = utc()
            .parse_line("31/02/24 10:00:00 Rule [X] Total Match % = 1.2.3%, MatchTime = .s")
            .unwrap();
        assert_eq!(m.end_timestamp_ms, None);
        assert_eq!(m.total_match_pct, None);
        assert_eq!(m.match_time_sec, None);
    }

    #[test]
    fn test_reader_tolerates_invalid_utf8() {
        let mut bytes = b"Rule [A] Matches = 3\n".to_vec();
        bytes.extend_from_slice(&[0xff, b' ', b'R', b'u', b'l', b'e', b' ', b'[', b'B', b']', b'\n']);
        let rules = utc().parse_reader(io::Cursor::new(bytes)).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].rule, "B");
    }

    fn offset_secs(tz: &str) -> i32 {
        match parse_timezone(tz).unwrap() {
            LogTimezone::Fixed(offset) => offset.local_minus_utc(),
            other => panic!("expected a fixed offset, got {:?}", other),
        }
    }

    #[test]
    fn test_timezone_offsets() {
        assert_eq!(offset_secs("+05:30"), 19_800);
        assert_eq!(offset_secs("+0530"), 19_800);
        assert_eq!(offset_secs("-08:00"), -28_800);
        assert_eq!(offset_secs("Z"), 0);
        assert_eq!(offset_secs(" utc "), 0);

        for bad in ["Mars/Olympus", "05:30", "+5:30", "+25:00", "+05:60", "+05:30:00", ""] {
            assert!(
                matches!(parse_timezone(bad), Err(ParseError::InvalidTimezone(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_named_zones() {
        assert_eq!(parse_timezone("Asia/Kolkata").unwrap(), LogTimezone::Named(Tz::Asia__Kolkata));
        assert_eq!(LogTimezone::default(), LogTimezone::Named(Tz::Asia__Kolkata));
        assert_eq!(parse_timezone("Asia/Kolkata").unwrap().to_string(), "Asia/Kolkata");

        let kolkata = RuleLogParser::new(parse_timezone("Asia/Kolkata").unwrap());
        let m = kolkata.parse_line("05/03/24 10:15:30 Rule [R] MatchTime = 1s").unwrap();
        assert_eq!(m.end_timestamp_ms, Some(1_709_633_730_000 - 19_800_000));
    }

    #[test]
    fn test_named_zone_follows_dst() {
        let ny = RuleLogParser::new(parse_timezone("America/New_York").unwrap());

        // 2024-07-01 12:00 EDT (UTC-4) and 2024-01-15 12:00 EST (UTC-5)
        let summer = ny.parse_line("01/07/24 12:00:00 Rule [S]").unwrap();
        assert_eq!(summer.end_timestamp_ms, Some(1_719_849_600_000));
        let winter = ny.parse_line("15/01/24 12:00:00 Rule [W]").unwrap();
        assert_eq!(winter.end_timestamp_ms, Some(1_705_338_000_000));
    }

    #[test]
    fn test_dst_transitions_resolve() {
        let ny = parse_timezone("America/New_York").unwrap();
        let local = |s: &str| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap();

        // 2024-11-03 01:30 happens twice; the earlier (EDT) instant is 05:30Z
        assert_eq!(ny.local_to_epoch_ms(local("03/11/24 01:30:00")), Some(1_730_611_800_000));

        // 2024-03-10 02:30 does not exist; read with EST it is 07:30Z (03:30 EDT)
        assert_eq!(ny.local_to_epoch_ms(local("10/03/24 02:30:00")), Some(1_710_055_800_000));
    }
}
