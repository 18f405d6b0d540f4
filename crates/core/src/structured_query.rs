//! Structured-query extraction and boosting (§4.15 step 8).
//!
//! `QueryPlanner::search` parses the raw query once per call for a temporal
//! range, a document-type intent, and a handful of entity strings, then adds
//! a per-candidate `structuredQueryBoost` alongside the rest of
//! `ScoreBreakdown`. None of this touches the lexical/semantic fan-out
//! itself — it only nudges the final ranking, mirroring the reference
//! source's `StructuredQuery`/`DoctypeClassifier` split (see
//! `Tests/Unit/test_structured_query_boost.cpp` in the retrieval pack's
//! `original_source/`, which this module is grounded on since no production
//! header for it survived distillation into spec.md).

use crate::config::ScoringWeights;

#[derive(Debug, Clone, Copy)]
pub struct TemporalRange {
    pub start_epoch: f64,
    pub end_epoch: f64,
}

#[derive(Debug, Clone, Default)]
pub struct StructuredQuery {
    pub temporal: Option<TemporalRange>,
    pub doc_type_intent: Option<String>,
    pub entities: Vec<String>,
}

impl StructuredQuery {
    pub fn is_empty(&self) -> bool {
        self.temporal.is_none() && self.doc_type_intent.is_none() && self.entities.is_empty()
    }
}

const SECS_PER_DAY: f64 = 86_400.0;

/// Parses the *raw, unlowercased* query so capitalized entity candidates
/// survive; `QueryPlanner::search` normalizes its own working copy of the
/// query separately for lexical/semantic fan-out.
pub fn parse(raw_query: &str, now: f64) -> StructuredQuery {
    StructuredQuery { temporal: parse_temporal(raw_query, now), doc_type_intent: parse_doc_type_intent(raw_query), entities: parse_entities(raw_query) }
}

fn parse_temporal(query: &str, now: f64) -> Option<TemporalRange> {
    let lower = query.to_lowercase();
    let day_start = |days_ago: f64| now - days_ago * SECS_PER_DAY;

    if lower.contains("today") {
        return Some(TemporalRange { start_epoch: day_start(1.0), end_epoch: now });
    }
    if lower.contains("yesterday") {
        return Some(TemporalRange { start_epoch: day_start(2.0), end_epoch: day_start(1.0) });
    }
    if lower.contains("last week") {
        return Some(TemporalRange { start_epoch: day_start(14.0), end_epoch: day_start(7.0) });
    }
    if lower.contains("this week") {
        return Some(TemporalRange { start_epoch: day_start(7.0), end_epoch: now });
    }
    if lower.contains("last month") {
        return Some(TemporalRange { start_epoch: day_start(60.0), end_epoch: day_start(30.0) });
    }
    if lower.contains("this month") {
        return Some(TemporalRange { start_epoch: day_start(30.0), end_epoch: now });
    }
    if lower.contains("last year") {
        return Some(TemporalRange { start_epoch: day_start(730.0), end_epoch: day_start(365.0) });
    }
    if lower.contains("this year") {
        return Some(TemporalRange { start_epoch: day_start(365.0), end_epoch: now });
    }
    None
}

/// Intents mirror the reference source's `testExtensionsForAllIntents`
/// list; unknown intents (and the default "no intent detected" case)
/// return `None`/empty, matching `DoctypeClassifier::extensionsForIntent`'s
/// documented behavior for an unknown intent.
pub fn extensions_for_intent(intent: &str) -> &'static [&'static str] {
    match intent {
        "legal_document" => &["pdf", "doc", "docx"],
        "financial_document" => &["pdf", "xlsx", "xls", "csv"],
        "job_document" => &["pdf", "doc", "docx"],
        "presentation" => &["ppt", "pptx", "key", "odp"],
        "image" => &["png", "jpg", "jpeg", "gif", "heic", "tiff", "bmp"],
        "spreadsheet" => &["xlsx", "xls", "csv", "numbers", "ods"],
        "notes" => &["md", "txt", "note"],
        "documentation" => &["md", "txt", "rst", "adoc"],
        "report" => &["pdf", "doc", "docx", "xlsx"],
        "application_form" => &["pdf", "doc", "docx"],
        "reference_material" => &["pdf", "epub", "md"],
        _ => &[],
    }
}

fn parse_doc_type_intent(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    const KEYWORDS: &[(&str, &str)] = &[
        ("contract", "legal_document"),
        ("agreement", "legal_document"),
        ("nda", "legal_document"),
        ("invoice", "financial_document"),
        ("budget", "financial_document"),
        ("tax", "financial_document"),
        ("receipt", "financial_document"),
        ("resume", "job_document"),
        ("cv", "job_document"),
        ("cover letter", "job_document"),
        ("slide", "presentation"),
        ("deck", "presentation"),
        ("presentation", "presentation"),
        ("photo", "image"),
        ("picture", "image"),
        ("screenshot", "image"),
        ("spreadsheet", "spreadsheet"),
        ("note", "notes"),
        ("readme", "documentation"),
        ("documentation", "documentation"),
        ("report", "report"),
        ("form", "application_form"),
        ("application", "application_form"),
        ("manual", "reference_material"),
        ("reference", "reference_material"),
    ];
    KEYWORDS.iter().find(|(kw, _)| lower.contains(kw)).map(|(_, intent)| intent.to_string())
}

const STOPWORDS: &[&str] = &["The", "A", "An", "My", "Our", "Find", "Show", "Search", "For", "From", "In", "On", "With"];

/// Entity candidates: quoted phrases (literal, case preserved) plus bare
/// capitalized tokens (proper-noun heuristic), excluding the first word of
/// the query and a small stopword list.
fn parse_entities(query: &str) -> Vec<String> {
    let mut entities = Vec::new();

    let mut rest = query;
    while let Some(start) = rest.find('"') {
        if let Some(end) = rest[start + 1..].find('"') {
            let phrase = &rest[start + 1..start + 1 + end];
            if !phrase.is_empty() {
                entities.push(phrase.to_string());
            }
            rest = &rest[start + 1 + end + 1..];
        } else {
            break;
        }
    }

    for (idx, word) in query.split_whitespace().enumerate() {
        let trimmed: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if trimmed.len() < 3 || idx == 0 {
            continue;
        }
        if STOPWORDS.contains(&trimmed.as_str()) {
            continue;
        }
        if trimmed.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
            entities.push(trimmed);
        }
    }

    entities
}

/// Mirrors the reference `computeSqBoost`: temporal in-range/near-miss,
/// doc-type-intent extension match, and entity name/path substring matches
/// capped at `entity_match_cap`. Returns the combined boost to add to
/// `ScoreBreakdown.structured_query_boost`.
pub fn score(structured: &StructuredQuery, modified_at: f64, name: &str, path: &str, weights: &ScoringWeights) -> f64 {
    let mut boost = 0.0;

    if let Some(range) = structured.temporal {
        if modified_at >= range.start_epoch && modified_at <= range.end_epoch {
            boost += weights.temporal_boost_weight;
        } else {
            let range_size = range.end_epoch - range.start_epoch;
            if modified_at >= range.start_epoch - range_size && modified_at <= range.end_epoch + range_size {
                boost += weights.temporal_near_weight;
            }
        }
    }

    if let Some(intent) = &structured.doc_type_intent {
        let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
        if extensions_for_intent(intent).contains(&ext.as_str()) {
            boost += weights.doc_type_intent_weight;
        }
    }

    let name_lower = name.to_lowercase();
    let path_lower = path.to_lowercase();
    let mut entity_boost = 0.0;
    for entity in &structured.entities {
        let entity_lower = entity.to_lowercase();
        if name_lower.contains(&entity_lower) || path_lower.contains(&entity_lower) {
            entity_boost += weights.entity_match_weight;
        }
    }
    boost += entity_boost.min(weights.entity_match_cap);

    boost
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> ScoringWeights {
        ScoringWeights::default()
    }

    #[test]
    fn temporal_in_range_gets_full_boost() {
        let structured = StructuredQuery { temporal: Some(TemporalRange { start_epoch: 1_700_000_000.0, end_epoch: 1_702_500_000.0 }), ..Default::default() };
        let boost = score(&structured, 1_701_000_000.0, "report.pdf", "/home/user/report.pdf", &weights());
        assert_eq!(boost, weights().temporal_boost_weight);
    }

    #[test]
    fn temporal_near_miss_gets_partial_boost() {
        let range = TemporalRange { start_epoch: 1_700_000_000.0, end_epoch: 1_702_500_000.0 };
        let range_size = range.end_epoch - range.start_epoch;
        let structured = StructuredQuery { temporal: Some(range), ..Default::default() };
        let modified_at = range.start_epoch - range_size * 0.5;
        let boost = score(&structured, modified_at, "report.pdf", "/home/user/report.pdf", &weights());
        assert_eq!(boost, weights().temporal_near_weight);
    }

    #[test]
    fn temporal_far_outside_range_gets_no_boost() {
        let range = TemporalRange { start_epoch: 1_700_000_000.0, end_epoch: 1_702_500_000.0 };
        let range_size = range.end_epoch - range.start_epoch;
        let structured = StructuredQuery { temporal: Some(range), ..Default::default() };
        let modified_at = range.start_epoch - range_size * 3.0;
        let boost = score(&structured, modified_at, "old.pdf", "/home/user/old.pdf", &weights());
        assert_eq!(boost, 0.0);
    }

    #[test]
    fn doc_type_intent_matches_extension() {
        let structured = StructuredQuery { doc_type_intent: Some("financial_document".to_string()), ..Default::default() };
        let boost = score(&structured, 0.0, "budget.xlsx", "/home/user/budget.xlsx", &weights());
        assert_eq!(boost, weights().doc_type_intent_weight);

        let no_match = score(&structured, 0.0, "notes.txt", "/home/user/notes.txt", &weights());
        assert_eq!(no_match, 0.0);
    }

    #[test]
    fn unknown_intent_has_no_extensions() {
        assert!(extensions_for_intent("unknown_type").is_empty());
    }

    #[test]
    fn entity_match_checks_name_and_path() {
        let structured = StructuredQuery { entities: vec!["Acme".to_string()], ..Default::default() };
        let boost = score(&structured, 0.0, "report.pdf", "/home/user/Acme/report.pdf", &weights());
        assert_eq!(boost, weights().entity_match_weight);
    }

    #[test]
    fn entity_boost_is_capped() {
        let structured = StructuredQuery { entities: vec!["Alice".into(), "Bob".into(), "Charlie".into()], ..Default::default() };
        let boost = score(&structured, 0.0, "file.pdf", "/home/Alice/Bob/Charlie/file.pdf", &weights());
        assert_eq!(boost, weights().entity_match_cap);
    }

    #[test]
    fn all_known_intents_have_extensions() {
        for intent in [
            "legal_document",
            "financial_document",
            "job_document",
            "presentation",
            "image",
            "spreadsheet",
            "notes",
            "documentation",
            "report",
            "application_form",
            "reference_material",
        ] {
            assert!(!extensions_for_intent(intent).is_empty(), "no extensions for {intent}");
        }
    }

    #[test]
    fn parse_extracts_quoted_entity() {
        let structured = parse(r#"find "Project Phoenix" budget"#, 0.0);
        assert!(structured.entities.iter().any(|e| e == "Project Phoenix"));
        assert_eq!(structured.doc_type_intent.as_deref(), Some("financial_document"));
    }

    #[test]
    fn parse_detects_temporal_phrase() {
        let now = 2_000_000.0 * SECS_PER_DAY;
        let structured = parse("notes from yesterday", now);
        assert!(structured.temporal.is_some());
    }
}
