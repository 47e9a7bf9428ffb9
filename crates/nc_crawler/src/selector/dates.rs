use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Parses a publication date as shown on a page.
///
/// RFC 3339 first, then each of `formats` as local time in `offset`. Leading
/// labels ("Published: ") and trailing text are tolerated. Formats without a
/// time component resolve to local midnight.
pub fn parse_published(text: &str, formats: &[String], offset: FixedOffset) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let candidates = candidates(text);
    for format in formats {
        for candidate in &candidates {
            if let Some(naive) = parse_naive(candidate, format) {
                if let Some(local) = offset.from_local_datetime(&naive).single() {
                    return Some(local.with_timezone(&Utc));
                }
            }
        }
    }
    None
}

fn candidates(text: &str) -> Vec<&str> {
    let mut out = vec![text];
    if let Some(idx) = text.find(|c: char| c.is_ascii_digit()) {
        if idx > 0 {
            out.push(&text[idx..]);
        }
    }
    out
}

fn parse_naive(text: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok((naive, _)) = NaiveDateTime::parse_and_remainder(text, format) {
        return Some(naive);
    }
    NaiveDate::parse_and_remainder(text, format)
        .ok()
        .map(|(date, _)| date.and_time(NaiveTime::MIN))
}
