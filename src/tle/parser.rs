//! TLE parsing utilities

use chrono::{DateTime, Utc};

use crate::tle::types::{OrbitalElementSet, ParseFailure};

/// Parse TLE epoch from line 1 to UTC DateTime
pub fn parse_tle_epoch_to_utc(line1: &str) -> Option<DateTime<Utc>> {
    // TLE line1 epoch fields (columns 19–32, 1-based; 18..32 0-based)
    let s = line1.get(18..32)?;
    let mut parts = s.trim().split('.');
    let yyddd = parts.next()?;
    let frac = parts.next().unwrap_or("0");
    if yyddd.len() < 3 {
        return None;
    }
    let (yy_str, ddd_str) = yyddd.split_at(2);
    let yy: i32 = yy_str.parse().ok()?;
    let ddd: i32 = ddd_str.parse().ok()?;
    let year = if yy >= 57 { 1900 + yy } else { 2000 + yy };
    let jan1 = chrono::NaiveDate::from_ymd_opt(year, 1, 1)?;
    let date = jan1.checked_add_signed(chrono::Duration::days((ddd - 1) as i64))?;
    let frac_sec: f64 = format!("0.{}", frac).parse::<f64>().ok()? * 86400.0;
    let secs = frac_sec.trunc() as i64;
    let nanos = ((frac_sec - (secs as f64)) * 1e9).round() as i64;
    let ndt = date.and_hms_opt(0, 0, 0)?
        + chrono::Duration::seconds(secs)
        + chrono::Duration::nanoseconds(nanos);
    Some(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

/// NORAD catalog number (columns 3–7)
pub fn parse_catalog_number(line: &str) -> Option<u32> {
    line.get(2..7)?.trim().parse().ok()
}

/// Mean motion in revolutions per day from line 2 (columns 53–63)
pub fn parse_mean_motion(line2: &str) -> Option<f64> {
    line2.get(52..63)?.trim().parse().ok()
}

fn is_line(line: &str, number: char) -> bool {
    let mut chars = line.chars();
    chars.next() == Some(number) && chars.next() == Some(' ')
}

/// Whether line `i` opens a new record: a name line followed by line 1, or a
/// line 1 that directly follows a line 2.
fn starts_record(lines: &[(usize, &str)], i: usize) -> bool {
    let current = lines[i].1;
    let next = lines.get(i + 1).map(|&(_, l)| l);
    if is_line(current, '1') {
        i > 0 && is_line(lines[i - 1].1, '2')
    } else {
        !is_line(current, '2') && next.is_some_and(|l| is_line(l, '1'))
    }
}

/// Check that two lines form a structurally valid element pair.
fn check_pair(line1: &str, line2: &str) -> Result<(), String> {
    if !is_line(line1, '1') || !is_line(line2, '2') {
        return Err("expected line 1 followed by line 2".to_string());
    }
    let sat1 = parse_catalog_number(line1).ok_or("unreadable catalog number on line 1")?;
    let sat2 = parse_catalog_number(line2).ok_or("unreadable catalog number on line 2")?;
    if sat1 != sat2 {
        return Err(format!("catalog number mismatch: {} vs {}", sat1, sat2));
    }
    if parse_tle_epoch_to_utc(line1).is_none() {
        return Err("unreadable epoch".to_string());
    }
    Ok(())
}

/// Split a multi-object text block into element sets.
///
/// Each record is a name line followed by line 1 and line 2; bare two-line
/// records get a `NORAD <catalog>` name. Each malformed record is reported
/// once and skipped; parsing resumes at the next record boundary.
pub fn parse_element_sets(text: &str) -> (Vec<OrbitalElementSet>, Vec<ParseFailure>) {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, raw)| {
            (
                i + 1,
                raw.trim_matches(|c| c == '\u{feff}' || c == '\r' || c == '\n' || c == ' '),
            )
        })
        .filter(|(_, line)| !line.is_empty())
        .collect();

    let mut sets = Vec::new();
    let mut failures = Vec::new();
    let mut i = 0usize;
    let mut resyncing = false;

    while i < lines.len() {
        let (line_no, first) = lines[i];

        // Bare two-line record
        if is_line(first, '1') {
            if let Some(&(_, second)) = lines.get(i + 1) {
                if check_pair(first, second).is_ok() {
                    let catalog = parse_catalog_number(first).unwrap_or_default();
                    sets.push(OrbitalElementSet::new(
                        format!("NORAD {}", catalog),
                        first,
                        second,
                    ));
                    resyncing = false;
                    i += 2;
                    continue;
                }
            }
        }

        // Name + two lines
        let record = match (lines.get(i + 1), lines.get(i + 2)) {
            (Some(&(_, l1)), Some(&(_, l2))) => check_pair(l1, l2).map(|_| (l1, l2)),
            _ => Err("truncated record".to_string()),
        };
        match record {
            Ok((l1, l2)) => {
                sets.push(OrbitalElementSet::new(first, l1, l2));
                resyncing = false;
                i += 3;
            }
            Err(reason) => {
                if !resyncing || starts_record(&lines, i) {
                    failures.push(ParseFailure {
                        line: line_no,
                        reason,
                    });
                    resyncing = true;
                }
                i += 1;
            }
        }
    }

    (sets, failures)
}
