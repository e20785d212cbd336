//! Invoice date-label parsing.
//!
//! Providers label invoices inconsistently: full ISO dates, year-month in
//! either order, a French month name plus year, or a bare year. Everything
//! short of a full date normalizes to the first day of the period.

use chrono::NaiveDate;

/// French month names indexed by month number - 1.
pub const FRENCH_MONTHS: [&str; 12] = [
    "Janvier",
    "Février",
    "Mars",
    "Avril",
    "Mai",
    "Juin",
    "Juillet",
    "Août",
    "Septembre",
    "Octobre",
    "Novembre",
    "Décembre",
];

/// French month name for a 1-based month number.
pub fn french_month_name(month: u32) -> Option<&'static str> {
    FRENCH_MONTHS.get(month.checked_sub(1)? as usize).copied()
}

/// Month number for a French month name, case-insensitive.
pub fn french_month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    FRENCH_MONTHS
        .iter()
        .position(|m| m.to_lowercase() == lower)
        .map(|idx| idx as u32 + 1)
}

/// Quarter label for a 1-based month number.
pub fn quarter_for_month(month: u32) -> &'static str {
    match month {
        1..=3 => "Q1",
        4..=6 => "Q2",
        7..=9 => "Q3",
        _ => "Q4",
    }
}

/// Parse a human date label to a concrete date.
///
/// Accepted forms:
/// - `YYYY-MM-DD` (also with `/` separators)
/// - `YYYY-MM` / `YYYY/MM` -> first of the month
/// - `MM/YYYY` -> first of the month
/// - `<French month> YYYY` in either word order -> first of the month
/// - bare `YYYY` -> January 1st
pub fn parse_date_label(label: &str) -> Option<NaiveDate> {
    let txt = label.trim();
    if txt.is_empty() {
        return None;
    }

    if let Some((y, m, d)) = find_ymd(txt) {
        return NaiveDate::from_ymd_opt(y, m, d);
    }

    if let Some((y, m)) = find_year_month(txt) {
        return NaiveDate::from_ymd_opt(y, m, 1);
    }

    if let Some((m, y)) = find_month_year(txt) {
        return NaiveDate::from_ymd_opt(y, m, 1);
    }

    let year = find_year(txt)?;
    let lower = txt.to_lowercase();
    for (idx, name) in FRENCH_MONTHS.iter().enumerate() {
        if lower.contains(&name.to_lowercase()) {
            return NaiveDate::from_ymd_opt(year, idx as u32 + 1, 1);
        }
    }

    // Only a year present.
    NaiveDate::from_ymd_opt(year, 1, 1)
}

/// Normalize a date label to ISO `YYYY-MM-DD`, additionally accepting the
/// `dd/mm/yyyy` form some providers emit.
pub fn normalize_date_label(label: &str) -> Option<String> {
    let txt = label.trim();
    if let Some((d, m, y)) = find_dmy(txt) {
        let date = NaiveDate::from_ymd_opt(y, m, d)?;
        return Some(date.format("%Y-%m-%d").to_string());
    }
    parse_date_label(txt).map(|d| d.format("%Y-%m-%d").to_string())
}

fn digits(s: &str) -> Vec<(usize, usize)> {
    // Runs of consecutive ASCII digits as (start, len).
    let bytes = s.as_bytes();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            runs.push((start, i - start));
        } else {
            i += 1;
        }
    }
    runs
}

fn sep_between(s: &str, a_end: usize, b_start: usize) -> bool {
    s[a_end..b_start].chars().all(|c| c == '-' || c == '/') && a_end < b_start
}

fn find_ymd(s: &str) -> Option<(i32, u32, u32)> {
    let runs = digits(s);
    for w in runs.windows(3) {
        let [(s1, l1), (s2, l2), (s3, l3)] = [w[0], w[1], w[2]];
        if l1 == 4
            && l2 == 2
            && l3 == 2
            && sep_between(s, s1 + l1, s2)
            && sep_between(s, s2 + l2, s3)
        {
            let y = s[s1..s1 + 4].parse().ok()?;
            let m = s[s2..s2 + 2].parse().ok()?;
            let d = s[s3..s3 + 2].parse().ok()?;
            return Some((y, m, d));
        }
    }
    None
}

fn find_dmy(s: &str) -> Option<(u32, u32, i32)> {
    let runs = digits(s);
    if runs.len() != 3 {
        return None;
    }
    let [(s1, l1), (s2, l2), (s3, l3)] = [runs[0], runs[1], runs[2]];
    if l1 == 2 && l2 == 2 && l3 == 4 && sep_between(s, s1 + l1, s2) && sep_between(s, s2 + l2, s3)
    {
        let d = s[s1..s1 + 2].parse().ok()?;
        let m = s[s2..s2 + 2].parse().ok()?;
        let y = s[s3..s3 + 4].parse().ok()?;
        return Some((d, m, y));
    }
    None
}

fn find_year_month(s: &str) -> Option<(i32, u32)> {
    let runs = digits(s);
    for w in runs.windows(2) {
        let [(s1, l1), (s2, l2)] = [w[0], w[1]];
        if l1 == 4 && l2 == 2 && sep_between(s, s1 + l1, s2) {
            let y = s[s1..s1 + 4].parse().ok()?;
            let m: u32 = s[s2..s2 + 2].parse().ok()?;
            if (1..=12).contains(&m) {
                return Some((y, m));
            }
        }
    }
    None
}

fn find_month_year(s: &str) -> Option<(u32, i32)> {
    let runs = digits(s);
    for w in runs.windows(2) {
        let [(s1, l1), (s2, l2)] = [w[0], w[1]];
        if l1 == 2 && l2 == 4 && sep_between(s, s1 + l1, s2) {
            let m: u32 = s[s1..s1 + 2].parse().ok()?;
            let y = s[s2..s2 + 4].parse().ok()?;
            if (1..=12).contains(&m) {
                return Some((m, y));
            }
        }
    }
    None
}

fn find_year(s: &str) -> Option<i32> {
    digits(s)
        .into_iter()
        .filter(|(_, len)| *len == 4)
        .filter_map(|(start, _)| s[start..start + 4].parse::<i32>().ok())
        .find(|y| (1900..=2100).contains(y))
}
