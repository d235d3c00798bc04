// Review text normalization.
//
// Store reviews are noisy: links, "Read more" stubs left by the scraper,
// emoji-only ratings, reviews in scripts the embedding model never saw. This
// module turns a raw ReviewRecord into a cleaned sentence (for the sentence
// embedder) and a content-token sequence (for hashing and keyword scoring),
// or rejects it with a typed reason.
//
// Normalization is a pure function of the text. The stop word list and
// regexes are built once and shared by every review of a run.

use std::collections::HashSet;

use chrono::{FixedOffset, NaiveDate};
use regex_lite::Regex;
use stop_words::{get, LANGUAGE};

use crate::error::{PipelineError, UnprocessableReason};
use crate::reviews::models::ReviewRecord;

/// Below this share of Latin-script letters a review is treated as written
/// in an unsupported language.
const MIN_LATIN_RATIO: f64 = 0.5;

/// A review that survived normalization, ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanText {
    pub review_id: String,
    /// Calendar day in the run's reporting offset
    pub date: NaiveDate,
    /// Lower-cased text with links and boilerplate removed
    pub text: String,
    /// Content tokens in reading order, stop words removed
    pub tokens: Vec<String>,
}

#[derive(Clone)]
pub struct TextNormalizer {
    stop_words: HashSet<String>,
    url: Regex,
    email: Regex,
    boilerplate: Regex,
    whitespace: Regex,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextNormalizer {
    pub fn new() -> Self {
        let stop_words: HashSet<String> = get(LANGUAGE::English)
            .into_iter()
            .map(|w| w.to_lowercase())
            .collect();

        Self {
            stop_words,
            url: Regex::new(r"(?:https?://|www\.)\S+").expect("valid url regex"),
            email: Regex::new(r"\S+@\S+\.\S+").expect("valid email regex"),
            boilerplate: Regex::new(
                r"\(?\b(?:read more|full review|translated by google|review edited|edited)\b\)?",
            )
            .expect("valid boilerplate regex"),
            whitespace: Regex::new(r"\s+").expect("valid whitespace regex"),
        }
    }

    /// Clean and tokenize one review.
    pub fn normalize(
        &self,
        record: &ReviewRecord,
        offset: &FixedOffset,
    ) -> Result<CleanText, PipelineError> {
        let reject = |reason| PipelineError::UnprocessableText {
            review_id: record.id.clone(),
            reason,
        };

        let trimmed = record.text.trim();
        if trimmed.is_empty() {
            return Err(reject(UnprocessableReason::Empty));
        }

        let text = self.clean(trimmed);

        let mut letters = 0usize;
        let mut latin = 0usize;
        for c in text.chars().filter(|c| c.is_alphabetic()) {
            letters += 1;
            if is_latin(c) {
                latin += 1;
            }
        }
        if letters == 0 {
            return Err(reject(UnprocessableReason::NonLinguistic));
        }
        if (latin as f64) / (letters as f64) < MIN_LATIN_RATIO {
            return Err(reject(UnprocessableReason::UnsupportedLanguage));
        }

        let tokens = self.tokenize(&text);
        if tokens.is_empty() {
            return Err(reject(UnprocessableReason::NoContentTokens));
        }

        Ok(CleanText {
            review_id: record.id.clone(),
            date: record.local_date(offset),
            text,
            tokens,
        })
    }

    /// Lower-case and strip links, e-mail addresses and store boilerplate.
    pub fn clean(&self, text: &str) -> String {
        let lower = text.to_lowercase().replace('\u{2019}', "'");
        let no_urls = self.url.replace_all(&lower, " ");
        let no_emails = self.email.replace_all(&no_urls, " ");
        let no_boilerplate = self.boilerplate.replace_all(&no_emails, " ");
        self.whitespace
            .replace_all(&no_boilerplate, " ")
            .trim()
            .to_string()
    }

    /// Split cleaned text into content tokens.
    ///
    /// Apostrophes stay inside words so contractions ("don't") are matched
    /// against the stop word list as written.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .map(|t| t.trim_matches('\''))
            .filter(|t| t.chars().count() > 1)
            .filter(|t| !self.stop_words.contains(*t))
            .filter(|t| t.chars().any(|c| c.is_alphabetic()) || t.len() <= 4)
            .map(str::to_string)
            .collect()
    }
}

fn is_latin(c: char) -> bool {
    c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c)
}
