use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

// UK postcode, e.g. "SW1A 1AA" or "M1 1AE".
static POSTCODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[A-Z]{1,2}[0-9][A-Z0-9]?\s*[0-9][A-Z]{2}\b").unwrap());

// UK phone shapes: 11-digit national, +44 international, bracketed area code.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:0[0-9]{10}|(?:\+44|0044)\s?[0-9]{10}|\(?0[0-9]{3,4}\)?\s?[0-9]{3}\s?[0-9]{4})\b")
        .unwrap()
});

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

// Account-number / sort-code shapes.
static BANK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[0-9]{6}[-\s]?[0-9]{8}|[0-9]{2}[-\s][0-9]{2}[-\s][0-9]{2})\b").unwrap()
});

// Noise common to tribunal PDFs: page-number lines and BAILII boilerplate.
static PAGE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Page\s+\d+\s+of\s+\d+\s*$").unwrap());
static DASHED_PAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*-\s*\d+\s*-\s*$").unwrap());
static BAILII_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)BAILII:\s*Copyright Policy.*?Donate to BAILII").unwrap());
static UNICODE_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{00a0}\x{2000}-\x{200b}\x{2028}\x{2029}]+").unwrap());

static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());
static MULTI_NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static LINE_EDGE_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" *\n *").unwrap());

/// Counters for PII placeholders substituted during cleaning.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RedactionStats {
    pub postcodes: usize,
    pub phones: usize,
    pub emails: usize,
    pub bank_details: usize,
}

impl RedactionStats {
    pub fn total(&self) -> usize {
        self.postcodes + self.phones + self.emails + self.bank_details
    }

    pub fn merge(&mut self, other: RedactionStats) {
        self.postcodes += other.postcodes;
        self.phones += other.phones;
        self.emails += other.emails;
        self.bank_details += other.bank_details;
    }
}

/// Cleans extracted tribunal text for indexing.
///
/// Normalizes Unicode to NFC, repairs common ligature/smart-punctuation
/// mis-decodings, strips PDF noise, collapses whitespace and redacts PII
/// with typed placeholders. Redaction is mandatory before indexing.
pub struct TextCleaner {
    redact_pii: bool,
    stats: RedactionStats,
}

impl Default for TextCleaner {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TextCleaner {
    pub fn new(redact_pii: bool) -> Self {
        Self {
            redact_pii,
            stats: RedactionStats::default(),
        }
    }

    pub fn clean(&mut self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let text = fix_encoding(text);
        let text = remove_noise(&text);
        let text = normalize_whitespace(&text);
        let text = if self.redact_pii {
            self.redact(&text)
        } else {
            text
        };
        text.trim().to_string()
    }

    pub fn stats(&self) -> RedactionStats {
        self.stats
    }

    fn redact(&mut self, text: &str) -> String {
        self.stats.postcodes += POSTCODE_RE.find_iter(text).count();
        let text = POSTCODE_RE.replace_all(text, "[POSTCODE]");
        self.stats.phones += PHONE_RE.find_iter(&text).count();
        let text = PHONE_RE.replace_all(&text, "[PHONE]");
        self.stats.emails += EMAIL_RE.find_iter(&text).count();
        let text = EMAIL_RE.replace_all(&text, "[EMAIL]");
        self.stats.bank_details += BANK_RE.find_iter(&text).count();
        BANK_RE.replace_all(&text, "[BANK_DETAILS]").into_owned()
    }
}

fn fix_encoding(text: &str) -> String {
    let nfc: String = text.nfc().collect();
    let mut out = String::with_capacity(nfc.len());
    for ch in nfc.chars() {
        match ch {
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201c}' | '\u{201d}' => out.push('"'),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{fb01}' => out.push_str("fi"),
            '\u{fb02}' => out.push_str("fl"),
            '\u{fb00}' => out.push_str("ff"),
            other => out.push(other),
        }
    }
    out
}

fn remove_noise(text: &str) -> String {
    let text = PAGE_NUMBER_RE.replace_all(text, " ");
    let text = DASHED_PAGE_RE.replace_all(&text, " ");
    let text = BAILII_RE.replace_all(&text, " ");
    UNICODE_SPACE_RE.replace_all(&text, " ").into_owned()
}

fn normalize_whitespace(text: &str) -> String {
    let text = text.replace('\t', " ");
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = MULTI_SPACE_RE.replace_all(&text, " ");
    let text = LINE_EDGE_SPACE_RE.replace_all(&text, "\n");
    MULTI_NEWLINE_RE.replace_all(&text, "\n\n").into_owned()
}

/// One-shot cleaning without stats tracking.
pub fn clean_text(text: &str, redact_pii: bool) -> String {
    TextCleaner::new(redact_pii).clean(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_postcode() {
        let mut cleaner = TextCleaner::default();
        let out = cleaner.clean("The property at 12 High Street, SW1A 1AA was inspected.");
        assert!(out.contains("[POSTCODE]"));
        assert!(!out.contains("SW1A"));
        assert_eq!(cleaner.stats().postcodes, 1);
    }

    #[test]
    fn redacts_email_and_phone() {
        let mut cleaner = TextCleaner::default();
        let out = cleaner.clean("Contact tenant@example.com or 07700900123 for access.");
        assert!(out.contains("[EMAIL]"));
        assert!(out.contains("[PHONE]"));
    }

    #[test]
    fn redacts_sort_code() {
        let out = clean_text("Refund to sort code 12-34-56 please.", true);
        assert!(out.contains("[BANK_DETAILS]"));
    }

    #[test]
    fn preserves_statute_references() {
        let out = clean_text(
            "The landlord failed to comply with section 213 of the Housing Act 2004.",
            true,
        );
        assert!(out.contains("section 213"));
        assert!(out.contains("Housing Act 2004"));
    }

    #[test]
    fn strips_page_noise() {
        let out = clean_text("Decision text.\nPage 3 of 12\nMore text.", true);
        assert!(!out.contains("Page 3 of 12"));
        assert!(out.contains("Decision text."));
    }

    #[test]
    fn collapses_whitespace() {
        let out = clean_text("a   b\t c\n\n\n\nd", false);
        assert_eq!(out, "a b c\n\nd");
    }

    #[test]
    fn fixes_smart_quotes_and_ligatures() {
        let out = clean_text("\u{201c}the \u{fb01}nding\u{201d} \u{2014} tribunal\u{2019}s view", false);
        assert_eq!(out, "\"the finding\" - tribunal's view");
    }

    #[test]
    fn no_redaction_when_disabled() {
        let out = clean_text("Write to tenant@example.com", false);
        assert!(out.contains("tenant@example.com"));
    }
}
