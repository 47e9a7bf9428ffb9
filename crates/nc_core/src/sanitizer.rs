use std::collections::HashSet;

use crate::types::ArticleRecord;

/// Length, in characters, of a description derived from article content.
pub const DESCRIPTION_CHARS: usize = 200;

/// Normalizes scraped article text.
///
/// Repeated lines inside one article are treated as boilerplate (bylines,
/// share footers) and only their first occurrence is kept. A sentence that
/// legitimately appears twice is collapsed as well.
#[derive(Debug, Clone, Default)]
pub struct ContentSanitizer {
    ad_phrases: Vec<String>,
}

impl ContentSanitizer {
    pub fn new<I, S>(ad_phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let ad_phrases = ad_phrases
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty() && seen.insert(p.clone()))
            .collect();
        Self { ad_phrases }
    }

    pub fn ad_phrases(&self) -> &[String] {
        &self.ad_phrases
    }

    /// Returns a sanitizer that strips this one's phrases plus `extra`.
    pub fn extended<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            self.ad_phrases
                .iter()
                .cloned()
                .chain(extra.into_iter().map(Into::into)),
        )
    }

    /// Newline-preserving clean text, the variant stored as `content`.
    pub fn clean(&self, raw: &str) -> String {
        let mut text = raw.to_string();
        for phrase in &self.ad_phrases {
            if text.contains(phrase.as_str()) {
                text = text.replace(phrase.as_str(), "");
            }
        }

        let mut seen = HashSet::new();
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| seen.insert(*line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Single-line variant used for previews and descriptions.
    pub fn flatten(&self, raw: &str) -> String {
        collapse_whitespace(&self.clean(raw))
    }

    /// Cleans content, derives a missing description and tidies the title.
    pub fn sanitize_record(&self, record: &mut ArticleRecord) {
        record.title = collapse_whitespace(&record.title);

        if let Some(raw) = record.content.take() {
            let cleaned = self.clean(&raw);
            record.content = (!cleaned.is_empty()).then_some(cleaned);
        }

        let description = record
            .description
            .take()
            .map(|d| collapse_whitespace(&d))
            .filter(|d| !d.is_empty());
        record.description = description.or_else(|| {
            record
                .content
                .as_deref()
                .map(|c| truncate_chars(&collapse_whitespace(c), DESCRIPTION_CHARS))
        });

        for field in [&mut record.reporter, &mut record.category] {
            if let Some(value) = field.take() {
                let value = collapse_whitespace(&value);
                *field = (!value.is_empty()).then_some(value);
            }
        }
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// One-shot form of [`ContentSanitizer::clean`].
pub fn clean(raw: &str, ad_phrases: &[&str]) -> String {
    ContentSanitizer::new(ad_phrases.iter().copied()).clean(raw)
}
