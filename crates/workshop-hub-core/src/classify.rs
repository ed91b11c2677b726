//! Heuristic classification of manuals and chunks.
//!
//! Everything here is best-effort pattern matching over extracted text; none
//! of it affects chunk boundaries.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ContentType, ManualMetadata};

const MAX_SECTION_TITLE_CHARS: usize = 100;

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

/// Human title from a filename: extension dropped, `-` and `_` become spaces.
pub fn title_from_filename(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case("pdf") => stem,
        _ => filename,
    };
    stem.replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Vehicle model codes mentioned in `text`, in first-seen order.
pub fn extract_model_codes(text: &str) -> Vec<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r"\bU\d{3,4}[A-Z]?\b",
            r"\b404(?:\.\d+)?\b",
            r"\b40[6]\b",
            r"\b41[16]\b",
            r"\b42[15]\b",
            r"\b43[57]\b",
            r"\bUGN\b",
            r"\bFLU-419\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern compiles"))
        .collect()
    });

    let mut codes: Vec<String> = Vec::new();
    for pattern in patterns {
        for m in pattern.find_iter(text) {
            let code = m.as_str().trim().to_string();
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
    }
    codes
}

/// `"1975"` or `"1962-1988"` from the years 1950–2029 found in `text`.
pub fn extract_year_range(text: &str) -> Option<String> {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let mut years: Vec<u32> = regex(&YEAR, r"\b(19[5-9]\d|20[0-2]\d)\b")
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    years.sort_unstable();
    years.dedup();

    match (years.first(), years.last()) {
        (Some(first), Some(last)) if first == last => Some(first.to_string()),
        (Some(first), Some(last)) => Some(format!("{}-{}", first, last)),
        _ => None,
    }
}

/// Coarse manual category from keywords in the filename and first page.
pub fn categorize_manual(filename: &str, content: &str) -> String {
    const RULES: &[(&[&str], &str)] = &[
        (&["operator", "owner"], "operator"),
        (&["service", "repair"], "service"),
        (&["parts", "catalog"], "parts"),
        (&["workshop"], "workshop"),
        (&["technical", "specification"], "technical"),
        (&["maintenance"], "maintenance"),
        (&["electrical", "wiring"], "electrical"),
        (&["hydraulic"], "hydraulic"),
        (&["engine"], "engine"),
        (&["transmission", "gearbox"], "transmission"),
        (&["axle", "differential"], "drivetrain"),
    ];

    let haystack = format!("{} {}", filename, content).to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| haystack.contains(k)))
        .map(|(_, category)| category.to_string())
        .unwrap_or_else(|| "general".to_string())
}

pub fn detect_content_type(text: &str) -> ContentType {
    static SPACED_COLUMNS: OnceLock<Regex> = OnceLock::new();
    static PROCEDURE: OnceLock<Regex> = OnceLock::new();
    static CAPTION: OnceLock<Regex> = OnceLock::new();

    if text.contains('|')
        || text.contains("\t\t")
        || regex(&SPACED_COLUMNS, r"\s{4,}\S+\s{4,}").is_match(text)
    {
        return ContentType::Table;
    }
    if text.contains("Step ") || regex(&PROCEDURE, r"(?m)^(?:\d+\.|[a-z]\))\s").is_match(text) {
        return ContentType::Procedure;
    }
    if regex(&CAPTION, r"(?m)^(?:Figure|Fig\.|Diagram|Image|Photo)\b").is_match(text) {
        return ContentType::DiagramCaption;
    }
    ContentType::Text
}

/// First numbered heading (`"3.2 Brakes"`) or all-caps line in raw page text.
pub fn extract_section_title(raw: &str) -> Option<String> {
    static NUMBERED: OnceLock<Regex> = OnceLock::new();
    let numbered = regex(&NUMBERED, r"^\d+(?:\.\d+)*\s+[A-Z]");

    for line in raw.lines() {
        let trimmed = line.trim();
        if numbered.is_match(trimmed) {
            return Some(trimmed.chars().take(MAX_SECTION_TITLE_CHARS).collect());
        }
        let len = trimmed.chars().count();
        if len > 3
            && len < MAX_SECTION_TITLE_CHARS
            && trimmed.chars().any(|c| c.is_ascii_uppercase())
            && trimmed == trimmed.to_uppercase()
        {
            return Some(trimmed.to_string());
        }
    }
    None
}

/// Metadata for a manual from its filename and first non-empty page.
pub fn derive_metadata(filename: &str, first_page: &str) -> ManualMetadata {
    ManualMetadata {
        title: title_from_filename(filename),
        category: categorize_manual(filename, first_page),
        model_codes: extract_model_codes(&format!("{} {}", first_page, filename)),
        year_range: extract_year_range(first_page),
    }
}
