//! Light ticket text cleaning: signature stripping, common typo fixes and
//! whitespace normalisation.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Pure `clean(subject, body) -> (subject, body)` seam used by the
/// `clean_text` tool.
pub trait TextCleaner: Send + Sync {
    fn clean(&self, subject: &str, body: &str) -> (String, String);
}

static SIGNATURE_CUTOFFS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^--\s*$",
        r"^thanks[,.! ]*$",
        r"^thank you[,.! ]*$",
        r"^best( regards)?[,.! ]*$",
        r"^regards[,.! ]*$",
        r"^sent from my iphone",
        r"^cheers[,.! ]*$",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).expect("signature pattern is valid"))
    .collect()
});

const COMMON_TYPOS: &[(&str, &str)] = &[
    ("hte", "the"),
    ("teh", "the"),
    ("adress", "address"),
    ("recieve", "receive"),
    ("seperate", "separate"),
    ("occurence", "occurrence"),
    ("occured", "occurred"),
    ("enviroment", "environment"),
    ("definately", "definitely"),
    ("intermitently", "intermittently"),
];

static TYPO_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let words = COMMON_TYPOS
        .iter()
        .map(|(typo, _)| regex::escape(typo))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b({})\b", words)).expect("typo pattern is valid")
});

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid"));
static TRAILING_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").expect("valid"));
static BLANK_LINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid"));

#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicCleaner;

impl TextCleaner for HeuristicCleaner {
    fn clean(&self, subject: &str, body: &str) -> (String, String) {
        let subject = fix_typos(subject.trim());
        let body = fix_typos(&strip_signature(body.trim()));

        let subject = WHITESPACE_RUN.replace_all(&subject, " ").trim().to_string();
        let body = TRAILING_SPACES.replace_all(&body, "\n");
        let body = BLANK_LINE_RUN.replace_all(&body, "\n\n").trim().to_string();
        (subject, body)
    }
}

/// Drops everything from the first signature-looking line onwards.
fn strip_signature(body: &str) -> String {
    body.lines()
        .take_while(|line| {
            let line = line.trim();
            !SIGNATURE_CUTOFFS.iter().any(|re| re.is_match(line))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn fix_typos(text: &str) -> String {
    TYPO_PATTERN
        .replace_all(text, |caps: &Captures| {
            let word = &caps[0];
            let lower = word.to_lowercase();
            let fixed = COMMON_TYPOS
                .iter()
                .find(|(typo, _)| *typo == lower)
                .map(|(_, fix)| *fix)
                .unwrap_or(word);
            if word.starts_with(|c: char| c.is_uppercase()) {
                capitalize(fixed)
            } else {
                fixed.to_string()
            }
        })
        .into_owned()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_signature_block() {
        let (_, body) = HeuristicCleaner.clean(
            "SSO login fails",
            "I cannot log in since this morning.\n\nThanks,\nJane\nIT Ops",
        );
        assert_eq!(body, "I cannot log in since this morning.");
    }

    #[test]
    fn fixes_typos_and_keeps_capitals() {
        let (subject, body) =
            HeuristicCleaner.clean("Teh   VPN   enviroment", "it occured twice, definately");
        assert_eq!(subject, "The VPN environment");
        assert_eq!(body, "it occurred twice, definitely");
    }

    #[test]
    fn collapses_blank_lines() {
        let (_, body) = HeuristicCleaner.clean("s", "line one   \n\n\n\nline two");
        assert_eq!(body, "line one\n\nline two");
    }

    #[test]
    fn body_that_is_only_a_signature_becomes_empty() {
        let (subject, body) = HeuristicCleaner.clean("SSO login fails", "--\nJohn Smith");
        assert_eq!(subject, "SSO login fails");
        assert_eq!(body, "");
    }
}
