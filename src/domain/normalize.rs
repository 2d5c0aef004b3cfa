//! Normalization helpers shared by domain handlers.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use super::DomainEntity;

/// Labels and noise that never name an entity.
const DEFAULT_DENYLIST: &[&str] = &[
    r"(?i)^(total|sub-?total|sum|average|avg|mean)s?:?$",
    r"(?i)^(n/?a|none|tbd|tba|-)$",
    r"(?i)^page\s*\d+(\s*(of|/)\s*\d+)?$",
    r"^[\-–—_=.·・~\s]+$",
    r"^[※*]?\s*(注|備考|合計|計)\s*:?$",
    r"(?i)^(name|date|notes?|remarks?)$",
];

/// Leading glyphs carrying flags rather than names.
const FLAG_GLYPHS: &[char] = &[
    '*', '†', '‡', '#', '※', '◎', '○', '●', '△', '▲', '☆', '★', '◇', '◆', '□', '■',
];

/// Compiled list of text patterns to drop.
#[derive(Debug, Clone)]
pub struct Denylist {
    patterns: Vec<Regex>,
}

impl Denylist {
    /// Compile custom patterns.
    pub fn with_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Check if text matches any pattern.
    pub fn is_denied(&self, text: &str) -> bool {
        let text = text.trim();
        text.is_empty() || self.patterns.iter().any(|re| re.is_match(text))
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Check if no pattern is set.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for Denylist {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_DENYLIST
                .iter()
                .filter_map(|pat| Regex::new(pat).ok())
                .collect(),
        }
    }
}

/// Split a trailing parenthetical annotation off a value.
///
/// `"Alice (captain)"` gives `("Alice", Some("captain"))`. Full-width
/// brackets are accepted.
pub fn split_parenthetical(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim();
    let Some(close) = trimmed.chars().last().filter(|c| *c == ')' || *c == '）') else {
        return (trimmed.to_string(), None);
    };
    let open = if close == ')' { '(' } else { '（' };
    let Some(start) = trimmed.rfind(open) else {
        return (trimmed.to_string(), None);
    };

    let inner = trimmed[start + open.len_utf8()..trimmed.len() - close.len_utf8()].trim();
    let head = trimmed[..start].trim();
    if head.is_empty() {
        return (trimmed.to_string(), None);
    }
    let annotation = (!inner.is_empty()).then(|| inner.to_string());
    (head.to_string(), annotation)
}

/// Separate leading flag glyphs from a name.
///
/// `"*†Bob"` gives `(["*", "†"], "Bob")`.
pub fn split_leading_flags(text: &str) -> (Vec<String>, String) {
    let trimmed = text.trim();
    let mut flags = Vec::new();
    let mut rest = trimmed;

    while let Some(c) = rest.chars().next() {
        if !FLAG_GLYPHS.contains(&c) {
            break;
        }
        flags.push(c.to_string());
        rest = rest[c.len_utf8()..].trim_start();
    }

    if rest.is_empty() {
        (Vec::new(), trimmed.to_string())
    } else {
        (flags, rest.to_string())
    }
}

/// Full date layouts tried in order.
const FULL_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y",
    "%d %b %Y", "%Y年%m月%d日",
];

/// Month-and-day layouts, parsed against a placeholder year.
const PARTIAL_DATE_FORMATS: &[&str] = &["%m/%d %Y", "%m-%d %Y", "%m.%d %Y", "%B %d %Y", "%b %d %Y", "%d %b %Y", "%m月%d日 %Y"];

/// Leap year used to validate month-day pairs without a year.
const PLACEHOLDER_YEAR: i32 = 2000;

/// Normalize a date to `YYYY-MM-DD`, or `--MM-DD` when the year is unknown.
///
/// A yearless date takes `reference_year` when given and valid in that
/// year. Returns `None` for text that is not a date.
pub fn canonical_date(text: &str, reference_year: Option<i32>) -> Option<String> {
    let (head, _) = split_parenthetical(text);
    let cleaned = head.trim().trim_end_matches(['.', ',']);
    if cleaned.is_empty() {
        return None;
    }

    for fmt in FULL_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cleaned, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }

    let dated = format!("{} {}", cleaned, PLACEHOLDER_YEAR);
    let (month, day) = PARTIAL_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&dated, fmt).ok())
        .map(|d| (d.month(), d.day()))?;

    match reference_year.and_then(|y| NaiveDate::from_ymd_opt(y, month, day)) {
        Some(date) => Some(date.format("%Y-%m-%d").to_string()),
        None => Some(format!("--{:02}-{:02}", month, day)),
    }
}

/// Drop repeated `(entity, header1, header2)` triples, keeping the first,
/// then sort by that triple.
pub fn dedup_and_sort(records: Vec<DomainEntity>) -> Vec<DomainEntity> {
    let mut seen: HashSet<(String, String, Option<String>)> = HashSet::new();
    let mut unique: Vec<DomainEntity> = records
        .into_iter()
        .filter(|r| seen.insert((r.entity.clone(), r.header1.clone(), r.header2.clone())))
        .collect();
    unique.sort_by(|a, b| {
        a.entity
            .cmp(&b.entity)
            .then_with(|| a.header1.cmp(&b.header1))
            .then_with(|| a.header2.cmp(&b.header2))
    });
    unique
}

/// Split a cell holding several names.
pub fn split_names(text: &str) -> Vec<String> {
    text.split(|c: char| matches!(c, ',' | '、' | '/' | '・' | ';' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denylist() {
        let deny = Denylist::default();
        assert!(deny.is_denied("Total"));
        assert!(deny.is_denied("  subtotal: "));
        assert!(deny.is_denied("Page 3 of 9"));
        assert!(deny.is_denied("---"));
        assert!(deny.is_denied(""));
        assert!(!deny.is_denied("Alice"));
    }

    #[test]
    fn test_custom_denylist_rejects_bad_pattern() {
        assert!(Denylist::with_patterns(&["("]).is_err());
        let deny = Denylist::with_patterns(&["^x+$"]).unwrap();
        assert!(deny.is_denied("xxx"));
    }

    #[test]
    fn test_split_parenthetical() {
        assert_eq!(
            split_parenthetical("Alice (captain)"),
            ("Alice".to_string(), Some("captain".to_string()))
        );
        assert_eq!(
            split_parenthetical("田中（代理）"),
            ("田中".to_string(), Some("代理".to_string()))
        );
        assert_eq!(split_parenthetical("Bob"), ("Bob".to_string(), None));
        assert_eq!(split_parenthetical("(only)"), ("(only)".to_string(), None));
    }

    #[test]
    fn test_split_leading_flags() {
        assert_eq!(
            split_leading_flags("*†Bob"),
            (vec!["*".to_string(), "†".to_string()], "Bob".to_string())
        );
        assert_eq!(split_leading_flags("◎ 佐藤"), (vec!["◎".to_string()], "佐藤".to_string()));
        assert_eq!(split_leading_flags("*"), (Vec::new(), "*".to_string()));
    }

    #[test]
    fn test_canonical_date() {
        assert_eq!(canonical_date("2024-03-05", None).as_deref(), Some("2024-03-05"));
        assert_eq!(canonical_date("2024/3/5", None).as_deref(), Some("2024-03-05"));
        assert_eq!(canonical_date("March 5, 2024", None).as_deref(), Some("2024-03-05"));
        assert_eq!(canonical_date("2024年3月5日", None).as_deref(), Some("2024-03-05"));
        assert_eq!(canonical_date("2/11", None).as_deref(), Some("--02-11"));
        assert_eq!(canonical_date("2/11", Some(2025)).as_deref(), Some("2025-02-11"));
        assert_eq!(canonical_date("3月5日(火)", None).as_deref(), Some("--03-05"));
        assert_eq!(canonical_date("Feb 29", Some(2023)).as_deref(), Some("--02-29"));
        assert_eq!(canonical_date("Alice", None), None);
        assert_eq!(canonical_date("13/45", None), None);
    }

    #[test]
    fn test_dedup_and_sort() {
        let records = vec![
            DomainEntity::new("Bob", "2024-01-02", "3"),
            DomainEntity::new("Alice", "2024-01-02", "5"),
            DomainEntity::new("Bob", "2024-01-02", "9"),
        ];
        let unique = dedup_and_sort(records);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].entity, "Alice");
        assert_eq!(unique[1].value, "3");
    }

    #[test]
    fn test_split_names() {
        assert_eq!(split_names("Ann, Ben / Cy"), vec!["Ann", "Ben", "Cy"]);
        assert_eq!(split_names("佐藤・鈴木"), vec!["佐藤", "鈴木"]);
    }
}
