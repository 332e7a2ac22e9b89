//! The frozen v1 pattern taxonomy.
//!
//! Five categories, each a *set* of regexes.  Content is scanned by every
//! regex in a category and the hits are unioned (set-dedup on the trimmed
//! substring), so a substring repeated across regexes counts once per
//! category.  Any change to the regexes, weights, or labels here is a
//! taxonomy version bump and must be reflected in
//! [`SCORER_VERSION`](super::SCORER_VERSION).

use regex::Regex;
use std::sync::LazyLock;

/// One detection category of the v1 taxonomy.
///
/// Declaration order is the canonical order: label sequences and severity
/// selection both follow it (highest weight first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Phone,
    Email,
    Url,
    Social,
    Obfuscation,
}

impl PatternKind {
    /// All categories in canonical order.
    pub const ALL: [PatternKind; 5] = [
        PatternKind::Phone,
        PatternKind::Email,
        PatternKind::Url,
        PatternKind::Social,
        PatternKind::Obfuscation,
    ];

    /// The category's contribution weight in the scoring formula.
    pub fn weight(self) -> f64 {
        match self {
            PatternKind::Phone => 0.85,
            PatternKind::Email => 0.80,
            PatternKind::Url => 0.50,
            PatternKind::Social => 0.40,
            PatternKind::Obfuscation => 0.15,
        }
    }

    /// The label carried in intercept results and stream events.
    pub fn label(self) -> &'static str {
        match self {
            PatternKind::Phone => "contact_info_phone",
            PatternKind::Email => "contact_info_email",
            PatternKind::Url => "external_link",
            PatternKind::Social => "social_platform_mention",
            PatternKind::Obfuscation => "obfuscation_detected",
        }
    }

    /// Human wording used when composing block reasons.
    pub fn human_name(self) -> &'static str {
        match self {
            PatternKind::Phone => "a phone number",
            PatternKind::Email => "an email address",
            PatternKind::Url => "an external link",
            PatternKind::Social => "a social platform mention",
            PatternKind::Obfuscation => "obfuscated contact details",
        }
    }

    /// The regex set for this category.
    pub fn regexes(self) -> &'static [Regex] {
        match self {
            PatternKind::Phone => &PHONE,
            PatternKind::Email => &EMAIL,
            PatternKind::Url => &URL,
            PatternKind::Social => &SOCIAL,
            PatternKind::Obfuscation => &OBFUSCATION,
        }
    }
}

// ---------------------------------------------------------------------------
// Regex sets
// ---------------------------------------------------------------------------

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("taxonomy regex must compile"))
        .collect()
}

static PHONE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        // International: + or 00 prefix, 1-3 digit country code, then
        // separator-tolerant 1-4 / 1-4 / 1-9 digit groups.
        r"(?:\+|00)[1-9]\d{0,2}[\s.-]?\d{1,4}[\s.-]?\d{1,4}[\s.-]?\d{1,9}",
        // US grouped: (555) 123-4567 and its space/dot/dash variants.
        r"\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}",
        // Condensed: a bare run of 10-15 digits.
        r"\b\d{10,15}\b",
    ])
});

static EMAIL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        // Standard local@domain.tld.
        r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        // Spoken form: user (at) domain (dot) tld -- parens optional,
        // whitespace liberal.
        r"(?i)\b[a-z0-9._%+-]+\s*(?:\(\s*at\s*\)|\bat\b)\s*[a-z0-9.-]+\s*(?:\(\s*dot\s*\)|\bdot\b)\s*[a-z]{2,}\b",
        // Letters spaced out around an @ sign: j o h n @ g m a i l.
        r"(?i)(?:[a-z0-9]\s+){2,}@(?:\s+[a-z0-9])+",
    ])
});

static URL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"https?://\S+",
        r"\bwww\.\S+",
        // Known shortener hosts, only when followed by a path segment.
        r"\b(?:bit\.ly|tinyurl\.com|goo\.gl|t\.co|short\.link)/\S+",
    ])
});

static SOCIAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(?:whatsapp|telegram|snapchat|snap|instagram|insta|discord|kik|signal)\b",
        r"(?i)\bdm\s+me\b",
        r"(?i)\btext\s+me\b",
        r"(?i)\bcontact\s+(?:me|us)\s+(?:at|on)\b",
    ])
});

static OBFUSCATION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        // Alphanumerics split by a run of two or more whitespace characters.
        r"[A-Za-z0-9]\s{2,}[A-Za-z0-9]",
        // The explicit spoken-address cue.
        r"(?i)\(\s*at\s*\)|\(\s*dot\s*\)",
        // Digits spelled out.
        r"(?i)\b(?:zero|one|two|three|four|five|six|seven|eight|nine)\b",
    ])
});
