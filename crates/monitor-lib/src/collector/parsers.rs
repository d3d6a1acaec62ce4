//! Parsers for in-pod diagnostic command output
//!
//! Each parser turns the text printed by one probe command into a typed
//! record. They never index past the end of a line: output with too few
//! fields or non-numeric tokens yields a [`ParseError`] describing what was
//! wrong, which callers log and treat as "metric unavailable".

use crate::models::{DiskMetrics, LoadAverage, MemoryMetrics, ProcessMetrics};
use std::str::FromStr;
use thiserror::Error;

/// Number of columns in a `ps aux` row; the last one holds the full command line
pub const PROCESS_FIELDS: usize = 11;

/// Columns a `ps aux` row needs before it can be used (USER through RSS)
pub const MIN_PROCESS_FIELDS: usize = 6;

/// Reason a probe's output could not be turned into a record
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("probe output is empty")]
    Empty,
    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },
    #[error("field `{field}` is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("total memory reported as zero")]
    ZeroTotal,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Rows parsed from a process listing together with the rows that were skipped
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    pub processes: Vec<ProcessMetrics>,
    pub skipped: Vec<ParseError>,
}

/// Parse the aggregate CPU utilisation printed by the `top | awk` probe
pub fn parse_cpu_usage(raw: &str) -> ParseResult<f64> {
    let token = raw.split_whitespace().next().ok_or(ParseError::Empty)?;
    parse_number("usage_percent", token)
}

/// Parse `/proc/loadavg`
///
/// ```text
/// 0.52 0.58 0.59 1/123 4567
/// ```
pub fn parse_load_average(raw: &str) -> ParseResult<LoadAverage> {
    let fields = non_empty_fields(raw)?;
    require_fields(&fields, 3)?;

    Ok(LoadAverage {
        one: parse_number("load_1min", fields[0])?,
        five: parse_number("load_5min", fields[1])?,
        fifteen: parse_number("load_15min", fields[2])?,
    })
}

/// Parse the `Mem:` line of `free -m`
///
/// ```text
/// Mem:           2000        1500         500           0         120         380
/// ```
pub fn parse_memory(raw: &str) -> ParseResult<MemoryMetrics> {
    let fields = non_empty_fields(raw)?;
    require_fields(&fields, 4)?;

    let total_mb: u64 = parse_number("total_mb", fields[1])?;
    let used_mb: u64 = parse_number("used_mb", fields[2])?;
    let free_mb: u64 = parse_number("free_mb", fields[3])?;

    if total_mb == 0 {
        return Err(ParseError::ZeroTotal);
    }

    Ok(MemoryMetrics {
        total_mb,
        used_mb,
        free_mb,
        usage_percent: used_mb as f64 / total_mb as f64 * 100.0,
    })
}

/// Parse a data line of `df -hP`
///
/// ```text
/// overlay          59G   12G   45G  21% /
/// ```
pub fn parse_disk(raw: &str) -> ParseResult<DiskMetrics> {
    let fields = non_empty_fields(raw)?;
    require_fields(&fields, 5)?;

    let percent = fields[4].trim_end_matches('%');

    Ok(DiskMetrics {
        filesystem: fields[0].to_string(),
        size: fields[1].to_string(),
        used: fields[2].to_string(),
        available: fields[3].to_string(),
        usage_percent: parse_number("usage_percent", percent)?,
    })
}

/// Parse a `ps aux` listing, keeping at most `limit` rows ordered by CPU
///
/// The first line is the column header and is discarded. Rows that cannot be
/// parsed are skipped and reported in [`ProcessTable::skipped`].
pub fn parse_processes(raw: &str, limit: usize) -> ProcessTable {
    let mut table = ProcessTable::default();

    for line in raw.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }

        match parse_process_row(line) {
            Ok(process) => table.processes.push(process),
            Err(e) => table.skipped.push(e),
        }
    }

    // ps already sorts, but the listing is not trusted to
    table
        .processes
        .sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    table.processes.truncate(limit);

    table
}

/// Parse one `ps aux` row
///
/// ```text
/// USER       PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND
/// root         1  0.0  0.1   1624   540 ?        Ss   10:00   0:00 sleep infinity
/// ```
pub fn parse_process_row(line: &str) -> ParseResult<ProcessMetrics> {
    let fields = split_fields(line, PROCESS_FIELDS);
    require_fields(&fields, MIN_PROCESS_FIELDS)?;

    Ok(ProcessMetrics {
        user: fields[0].to_string(),
        pid: parse_number("pid", fields[1])?,
        cpu_percent: parse_number("cpu_percent", fields[2])?,
        memory_percent: parse_number("memory_percent", fields[3])?,
        vsz: parse_number("vsz", fields[4])?,
        rss: parse_number("rss", fields[5])?,
        command: fields
            .get(PROCESS_FIELDS - 1)
            .map(|c| c.to_string())
            .unwrap_or_default(),
    })
}

/// Split on runs of whitespace into at most `max` fields; the last field
/// keeps the remainder of the line with its inner spacing intact.
pub fn split_fields(line: &str, max: usize) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        if fields.len() + 1 == max {
            fields.push(rest);
            break;
        }

        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }

    fields
}

fn non_empty_fields(raw: &str) -> ParseResult<Vec<&str>> {
    let fields: Vec<&str> = raw.split_whitespace().collect();
    if fields.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(fields)
}

fn require_fields(fields: &[&str], expected: usize) -> ParseResult<()> {
    if fields.len() < expected {
        return Err(ParseError::TooFewFields {
            expected,
            found: fields.len(),
        });
    }
    Ok(())
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> ParseResult<T> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS_OUTPUT: &str = "\
USER       PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND
root        42 35.0  2.1  12345  6789 ?        R    10:00   1:02 stress --cpu 2 --timeout 600
root        43 20.5  1.0   9000  4000 ?        R    10:00   0:40 stress --cpu 2 --timeout 600
app        101  4.2  8.3 204800 81920 ?        Sl   10:01   0:05 /usr/bin/python3 -m http.server 8080
root         1  0.0  0.1   1624   540 ?        Ss   10:00   0:00 sleep infinity
root       120  0.0  0.0   1700   900 pts/0    R+   10:05   0:00 ps aux --sort=-%cpu
";

    #[test]
    fn test_parse_cpu_usage() {
        assert_eq!(parse_cpu_usage("12.7").unwrap(), 12.7);
        assert_eq!(parse_cpu_usage("  3\n").unwrap(), 3.0);
    }

    #[test]
    fn test_parse_cpu_usage_rejects_garbage() {
        assert_eq!(parse_cpu_usage(""), Err(ParseError::Empty));
        assert!(matches!(
            parse_cpu_usage("sh: top: not found"),
            Err(ParseError::InvalidNumber { field: "usage_percent", .. })
        ));
    }

    #[test]
    fn test_parse_load_average() {
        let load = parse_load_average("0.52 0.58 0.59 1/123 4567").unwrap();
        assert_eq!(load.one, 0.52);
        assert_eq!(load.five, 0.58);
        assert_eq!(load.fifteen, 0.59);
    }

    #[test]
    fn test_parse_load_average_too_few_fields() {
        assert_eq!(
            parse_load_average("0.52 0.58"),
            Err(ParseError::TooFewFields {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_parse_memory_usage_percent() {
        let memory = parse_memory("Mem: 2000 1500 500").unwrap();
        assert_eq!(memory.total_mb, 2000);
        assert_eq!(memory.used_mb, 1500);
        assert_eq!(memory.free_mb, 500);
        assert!((memory.usage_percent - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_memory_full_free_line() {
        let memory =
            parse_memory("Mem:           7961        3120         812          45        4028        4530")
                .unwrap();
        assert_eq!(memory.total_mb, 7961);
        assert_eq!(memory.free_mb, 812);
    }

    #[test]
    fn test_parse_memory_malformed() {
        assert_eq!(
            parse_memory("Mem: 2000"),
            Err(ParseError::TooFewFields {
                expected: 4,
                found: 2
            })
        );
        assert_eq!(parse_memory("Mem: 0 0 0"), Err(ParseError::ZeroTotal));
        assert!(matches!(
            parse_memory("Mem: 2.0G 1.5G 500M"),
            Err(ParseError::InvalidNumber { field: "total_mb", .. })
        ));
    }

    #[test]
    fn test_parse_disk() {
        let disk = parse_disk("overlay          59G   12G   45G  42% /").unwrap();
        assert_eq!(disk.filesystem, "overlay");
        assert_eq!(disk.size, "59G");
        assert_eq!(disk.used, "12G");
        assert_eq!(disk.available, "45G");
        assert_eq!(disk.usage_percent, 42);
    }

    #[test]
    fn test_parse_disk_malformed() {
        assert_eq!(
            parse_disk("overlay 59G 12G"),
            Err(ParseError::TooFewFields {
                expected: 5,
                found: 3
            })
        );
        assert!(matches!(
            parse_disk("overlay 59G 12G 45G -"),
            Err(ParseError::InvalidNumber { field: "usage_percent", .. })
        ));
    }

    #[test]
    fn test_parse_processes_header_and_five_rows() {
        let table = parse_processes(PS_OUTPUT, 5);

        assert_eq!(table.processes.len(), 5);
        assert!(table.skipped.is_empty());
        assert_eq!(table.processes[0].pid, 42);
        assert_eq!(table.processes[0].cpu_percent, 35.0);
        assert_eq!(table.processes[0].command, "stress --cpu 2 --timeout 600");
        assert_eq!(table.processes[2].user, "app");
        assert_eq!(table.processes[2].vsz, 204800);
        assert_eq!(table.processes[2].rss, 81920);
    }

    #[test]
    fn test_parse_processes_limit_keeps_highest_cpu() {
        let table = parse_processes(PS_OUTPUT, 2);
        let pids: Vec<u32> = table.processes.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![42, 43]);
    }

    #[test]
    fn test_parse_processes_skips_short_rows() {
        let raw = "\
USER PID %CPU %MEM VSZ RSS TTY STAT START TIME COMMAND
root 1 0.0
root 7 1.5 0.2 1000 200
";
        let table = parse_processes(raw, 5);

        assert_eq!(table.processes.len(), 1);
        assert_eq!(table.processes[0].pid, 7);
        assert_eq!(table.processes[0].command, "");
        assert_eq!(
            table.skipped,
            vec![ParseError::TooFewFields {
                expected: MIN_PROCESS_FIELDS,
                found: 3
            }]
        );
    }

    #[test]
    fn test_parse_processes_busybox_layout_is_skipped() {
        // busybox ps prints PID USER TIME COMMAND
        let raw = "PID   USER     TIME  COMMAND\n    1 root      0:00 sleep infinity\n";
        let table = parse_processes(raw, 5);

        assert!(table.processes.is_empty());
        assert_eq!(table.skipped.len(), 1);
    }

    #[test]
    fn test_parse_processes_header_only() {
        let table = parse_processes("USER PID %CPU %MEM VSZ RSS TTY STAT START TIME COMMAND", 5);
        assert!(table.processes.is_empty());
        assert!(table.skipped.is_empty());
    }

    #[test]
    fn test_split_fields_keeps_command_remainder() {
        let fields = split_fields("a  b   c d e", 3);
        assert_eq!(fields, vec!["a", "b", "c d e"]);

        let fields = split_fields("  a b  ", 5);
        assert_eq!(fields, vec!["a", "b"]);

        assert!(split_fields("   ", 4).is_empty());
    }
}
