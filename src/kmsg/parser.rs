// SPDX-License-Identifier: Apache-2.0

//! Parser for records read from `/dev/kmsg`
//!
//! Each `read(2)` on the device yields exactly one record:
//! `priority,sequence,timestamp[,flags];message\n[ KEY=value\n]...`
//!
//! - priority: syslog priority (level in bits 0-2, facility above)
//! - sequence: kernel message sequence number
//! - timestamp: microseconds since boot
//! - flags: optional, `c` marks a continuation fragment
//! - message: the log text, followed by optional dictionary lines that start
//!   with a space
//!
//! Example: `6,1234,567890123456;eth0: link up`

use crate::kmsg::error::{KmsgError, Result};
use chrono::{DateTime, TimeDelta, Utc};

/// A decoded kmsg record, before it is placed on the wall clock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsgLine {
    pub priority_raw: u8,
    pub sequence: u64,
    /// Microseconds since boot (monotonic)
    pub timestamp_us: u64,
    /// Message text with the trailing newline and dictionary lines removed
    pub message: String,
    pub is_continuation: bool,
}

impl KmsgLine {
    /// Syslog level (0 = emerg .. 7 = debug)
    pub fn level(&self) -> u8 {
        self.priority_raw & 0x07
    }

    /// Converts the boot-relative timestamp into an absolute instant. Fails
    /// when the result is outside the representable range.
    pub fn wall_clock(&self, boot_time: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let offset = TimeDelta::microseconds(self.timestamp_us.min(i64::MAX as u64) as i64);
        boot_time.checked_add_signed(offset).ok_or_else(|| {
            KmsgError::Parse(format!(
                "Timestamp out of range: {}us after boot",
                self.timestamp_us
            ))
        })
    }
}

/// Determine when the host booted: now minus the uptime in `/proc/uptime`.
pub fn get_boot_time() -> Result<DateTime<Utc>> {
    let uptime_str = std::fs::read_to_string("/proc/uptime")
        .map_err(|e| KmsgError::BootTime(format!("Failed to read /proc/uptime: {}", e)))?;

    boot_time_from_uptime(&uptime_str, Utc::now())
}

fn boot_time_from_uptime(uptime_str: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let uptime_secs: f64 = uptime_str
        .split_whitespace()
        .next()
        .ok_or_else(|| KmsgError::BootTime("Empty /proc/uptime".to_string()))?
        .parse()
        .map_err(|e| KmsgError::BootTime(format!("Failed to parse uptime: {}", e)))?;

    if !uptime_secs.is_finite() || uptime_secs < 0.0 {
        return Err(KmsgError::BootTime(format!(
            "Invalid uptime value: {}",
            uptime_secs
        )));
    }

    // float to int casts saturate, the subtraction is what can overflow
    let uptime = TimeDelta::microseconds((uptime_secs * 1_000_000.0) as i64);
    now.checked_sub_signed(uptime)
        .ok_or_else(|| KmsgError::BootTime(format!("Uptime out of range: {}", uptime_secs)))
}

/// Parse a single record read from the device.
pub fn parse_kmsg_line(record: &str) -> Result<KmsgLine> {
    let (header, body) = record.split_once(';').ok_or_else(|| {
        KmsgError::Parse(format!("Missing ';' separator in kmsg record: {}", record))
    })?;

    let parts: Vec<&str> = header.split(',').collect();
    if parts.len() < 3 {
        return Err(KmsgError::Parse(format!(
            "Invalid kmsg header format, expected at least 3 parts: {}",
            header
        )));
    }

    let priority_raw: u8 = parts[0].parse().map_err(|e| {
        KmsgError::Parse(format!("Failed to parse priority '{}': {}", parts[0], e))
    })?;

    let sequence: u64 = parts[1].parse().map_err(|e| {
        KmsgError::Parse(format!("Failed to parse sequence '{}': {}", parts[1], e))
    })?;

    let timestamp_us: u64 = parts[2].parse().map_err(|e| {
        KmsgError::Parse(format!("Failed to parse timestamp '{}': {}", parts[2], e))
    })?;

    let is_continuation = parts.len() > 3 && parts[3..].contains(&"c");

    // Dictionary lines (" SUBSYSTEM=...") follow the first newline
    let message = body.split('\n').next().unwrap_or_default();

    Ok(KmsgLine {
        priority_raw,
        sequence,
        timestamp_us,
        message: message.to_string(),
        is_continuation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_simple_record() {
        let line = parse_kmsg_line("6,1234,567890;eth0: link up\n").unwrap();

        assert_eq!(line.priority_raw, 6);
        assert_eq!(line.level(), 6);
        assert_eq!(line.sequence, 1234);
        assert_eq!(line.timestamp_us, 567890);
        assert_eq!(line.message, "eth0: link up");
        assert!(!line.is_continuation);
    }

    #[test]
    fn test_parse_drops_dictionary_lines() {
        let record = "3,88,1000,-;usb 1-1: device descriptor read error\n SUBSYSTEM=usb\n DEVICE=c189:1\n";

        let line = parse_kmsg_line(record).unwrap();

        assert_eq!(line.message, "usb 1-1: device descriptor read error");
        assert_eq!(line.level(), 3);
    }

    #[test]
    fn test_parse_keeps_surrounding_whitespace() {
        // trimming is the watcher's job, the parser leaves the text alone
        let line = parse_kmsg_line("6,1,2;  padded  ").unwrap();
        assert_eq!(line.message, "  padded  ");

        let line = parse_kmsg_line("6,1,2;").unwrap();
        assert_eq!(line.message, "");
    }

    #[test]
    fn test_parse_continuation_flag() {
        let line = parse_kmsg_line("4,5678,123456,-,c;fragment").unwrap();

        assert!(line.is_continuation);
        assert_eq!(line.level(), 4);
    }

    #[test]
    fn test_parse_semicolon_in_message() {
        let line = parse_kmsg_line("6,1,2;a;b").unwrap();
        assert_eq!(line.message, "a;b");
    }

    #[test]
    fn test_level_masks_facility() {
        // facility 1 (user) + level 6
        let line = parse_kmsg_line("14,1234,567890;user space message").unwrap();
        assert_eq!(line.priority_raw, 14);
        assert_eq!(line.level(), 6);
    }

    #[test]
    fn test_parse_invalid_records() {
        assert!(parse_kmsg_line("6,1234,567890 missing semicolon").is_err());
        assert!(parse_kmsg_line("6,1234;message").is_err());
        assert!(parse_kmsg_line("x,1234,5;message").is_err());
        assert!(parse_kmsg_line("6,1234,-5;message").is_err());
    }

    #[test]
    fn test_wall_clock_offsets_from_boot() {
        let boot = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let line = parse_kmsg_line("6,1,1500000;hello").unwrap();

        assert_eq!(
            line.wall_clock(boot).unwrap(),
            boot + TimeDelta::milliseconds(1500)
        );
    }

    #[test]
    fn test_wall_clock_rejects_out_of_range_timestamp() {
        let boot = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let line = parse_kmsg_line("6,1,18446744073709551615;x").unwrap();

        assert!(matches!(line.wall_clock(boot), Err(KmsgError::Parse(_))));
    }

    #[test]
    fn test_boot_time_from_uptime() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();

        let boot = boot_time_from_uptime("3600.50 7000.00\n", now).unwrap();
        assert_eq!(boot, now - TimeDelta::milliseconds(3_600_500));

        assert!(boot_time_from_uptime("", now).is_err());
        assert!(boot_time_from_uptime("abc 1.0", now).is_err());
        assert!(boot_time_from_uptime("-4.0 1.0", now).is_err());
    }

    #[test]
    fn test_boot_time_rejects_huge_uptime() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();

        assert!(matches!(
            boot_time_from_uptime("1e300 0", now),
            Err(KmsgError::BootTime(_))
        ));
    }
}
