//! Composes PathRules' siblings — FtsStore, TypoLexicon, VectorIndex,
//! Scorer, SearchMerger, and the feedback subsystem — into the single
//! `search()` entry point a host process actually calls (§4.15).

use std::sync::Arc;

use crate::config::{Config, MergeConfig};
use crate::embedding_pipeline::Embedder;
use crate::error::Result;
use crate::feedback::{normalize_query, InteractionTracker, PathPreferences, TypeAffinity};
use crate::fts_store::FtsStore;
use crate::scorer::{MatchClassifier, ScoreBreakdown, ScoreInputs, Scorer};
use crate::search_merger::{LexicalCandidate, MergeCategory, SearchMerger, SemanticCandidate};
use crate::structured_query::{self, StructuredQuery};
use crate::typo_lexicon::TypoLexicon;
use crate::types::{Item, MatchType};
use crate::vector_index::VectorIndex;
use crate::vector_store::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCategory {
    NaturalLanguage,
    PathOrCode,
    ShortAmbiguous,
}

#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub cwd_path: Option<String>,
    pub frontmost_app_bundle_id: Option<String>,
    pub recent_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Highlight {
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub item_id: i64,
    pub path: String,
    pub name: String,
    pub kind: crate::types::ItemKind,
    pub match_type: MatchType,
    pub score: f64,
    pub snippet: String,
    pub highlights: Vec<Highlight>,
    pub file_size: u64,
    pub modification_date: f64,
    pub is_pinned: bool,
    pub open_count: u64,
    pub last_open_date: f64,
    /// Normalized semantic similarity in `[0,1]` (0.0 when this result had
    /// no semantic hit), already folded into `score` via `semanticBoost` but
    /// kept separately so the reranker cascade can gauge "high semantic
    /// variance in top-10" for its stage-2 trigger (§4.15 step 10).
    pub semantic_normalized: f64,
}

/// Any cross-encoder the host wires in for the optional stage-1/stage-2
/// rerank cascade. Bypassed whenever absent, matching `Extractor`'s
/// "ships only a plain implementation" shape.
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, candidates: &[(i64, String)]) -> Result<Vec<(i64, f64)>>;
}

/// Trims, lowercases, collapses internal whitespace, and strips a trailing
/// `*` (a leftover wildcard a user might type out of FTS habit).
pub fn normalize(query: &str) -> String {
    let normalized = normalize_query(query);
    normalized.strip_suffix('*').unwrap_or(&normalized).trim_end().to_string()
}

pub fn classify_query(normalized: &str) -> QueryCategory {
    let token_count = normalized.split_whitespace().count();
    if normalized.contains('/') || (normalized.contains('.') && !normalized.contains(' ')) {
        return QueryCategory::PathOrCode;
    }
    if normalized.len() <= 4 || token_count == 1 {
        return QueryCategory::ShortAmbiguous;
    }
    if token_count >= 3 {
        return QueryCategory::NaturalLanguage;
    }
    QueryCategory::ShortAmbiguous
}

/// `lexicalWeight/semanticWeight/similarityThreshold` per category, from
/// §4.15 step 6. `strong_lexical` distinguishes the two NaturalLanguage
/// rows (a query whose strict-FTS hit count already clears half the fanout
/// counts as "strong").
fn adaptive_merge_config(category: QueryCategory, strong_lexical: bool, base: &MergeConfig) -> MergeConfig {
    let (lexical_weight, semantic_weight, similarity_threshold) = match category {
        QueryCategory::NaturalLanguage if strong_lexical => (0.55, 0.45, 0.78),
        QueryCategory::NaturalLanguage => (0.45, 0.55, 0.74),
        QueryCategory::PathOrCode => (0.75, 0.25, base.similarity_threshold),
        QueryCategory::ShortAmbiguous => (0.65, 0.35, base.similarity_threshold),
    };
    MergeConfig { lexical_weight, semantic_weight, similarity_threshold, rrf_k: base.rrf_k, max_results: base.max_results }
}

fn semantic_only_cap(category: QueryCategory, strong_lexical: bool) -> usize {
    match category {
        QueryCategory::NaturalLanguage if strong_lexical => 6,
        QueryCategory::NaturalLanguage => 8,
        _ => 4,
    }
}

/// Splits an FTS5 `snippet()` output (`<b>…</b>` markers) into plain text
/// plus the byte ranges that were highlighted.
fn strip_snippet_tags(snippet: &str) -> (String, Vec<Highlight>) {
    let mut plain = String::with_capacity(snippet.len());
    let mut highlights = Vec::new();
    let mut tag_start = 0usize;

    let bytes = snippet.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if snippet[i..].starts_with("<b>") {
            tag_start = plain.len();
            i += 3;
            continue;
        }
        if snippet[i..].starts_with("</b>") {
            highlights.push(Highlight { offset: tag_start, length: plain.len() - tag_start });
            i += 4;
            continue;
        }
        let ch_len = snippet[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        plain.push_str(&snippet[i..i + ch_len]);
        i += ch_len;
    }
    (plain, highlights)
}

pub struct QueryPlanner<'a> {
    fts: &'a FtsStore,
    typo_lexicon: &'a TypoLexicon,
    vector_index: Option<&'a VectorIndex>,
    vector_store: Option<&'a VectorStore<'a>>,
    embedder: Option<Arc<dyn Embedder>>,
    config: &'a Config,
    path_preferences: Option<&'a PathPreferences<'a>>,
    type_affinity: Option<&'a TypeAffinity<'a>>,
    reranker: Option<&'a dyn Reranker>,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(fts: &'a FtsStore, typo_lexicon: &'a TypoLexicon, config: &'a Config) -> Self {
        Self {
            fts,
            typo_lexicon,
            vector_index: None,
            vector_store: None,
            embedder: None,
            config,
            path_preferences: None,
            type_affinity: None,
            reranker: None,
        }
    }

    pub fn with_semantic(mut self, vector_index: &'a VectorIndex, vector_store: &'a VectorStore<'a>, embedder: Arc<dyn Embedder>) -> Self {
        self.vector_index = Some(vector_index);
        self.vector_store = Some(vector_store);
        self.embedder = Some(embedder);
        self
    }

    pub fn with_feedback(mut self, path_preferences: &'a PathPreferences<'a>, type_affinity: &'a TypeAffinity<'a>) -> Self {
        self.path_preferences = Some(path_preferences);
        self.type_affinity = Some(type_affinity);
        self
    }

    pub fn with_reranker(mut self, reranker: &'a dyn Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn search(&self, raw_query: &str, limit: usize, context: &QueryContext) -> Result<Vec<SearchResult>> {
        let limit = limit.clamp(1, 200);
        let normalized = normalize(raw_query);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let structured = structured_query::parse(raw_query, crate::clock::now_unix());
        let category = classify_query(&normalized);
        let fanout = (limit * 3).max(limit).min(self.config.limits.fts_fanout_cap);

        let mut hits = self.fts.search_fts5(&normalized, fanout, false)?;
        if hits.is_empty() {
            hits = self.fts.search_fts5(&normalized, fanout, true)?;
        }
        if hits.is_empty() {
            let corrected = self.typo_correct(&normalized);
            if let Some(corrected) = corrected {
                if corrected != normalized {
                    hits = self.fts.search_fts5(&corrected, fanout, true)?;
                }
            }
        }

        let strong_lexical = hits.len() >= fanout / 2;

        if hits.is_empty() {
            let fuzzy_hits = self.fts.search_by_name_fuzzy(&normalized, fanout)?;
            hits = fuzzy_hits
                .into_iter()
                .map(|(item_id, _name)| crate::types::FtsHit { item_id, bm25_score: -1.0, snippet: String::new() })
                .collect();
        }

        let mut lexical_candidates = Vec::with_capacity(hits.len());
        let mut scored: Vec<(i64, ScoreBreakdown, crate::types::FtsHit, Item)> = Vec::new();

        for hit in hits {
            let Some(item) = self.fts.get_item_by_id(hit.item_id)? else { continue };
            lexical_candidates.push(LexicalCandidate { item_id: item.id, raw_score: hit.bm25_score.abs() });

            let match_type = if hit.snippet.is_empty() {
                MatchClassifier::classify(&normalized, &item.name, &item.path, 2)
            } else {
                MatchType::Content
            };

            let breakdown = self.score_item(&normalized, &item, match_type, Some(hit.bm25_score), context, &structured)?;
            scored.push((item.id, breakdown, hit, item));
        }

        let merged_order = self.merge_with_semantic(&normalized, category, strong_lexical, &lexical_candidates)?;

        let mut by_id: std::collections::HashMap<i64, (ScoreBreakdown, crate::types::FtsHit, Item)> =
            scored.into_iter().map(|(id, b, h, i)| (id, (b, h, i))).collect();

        let mut results = Vec::new();
        if let Some(merged_order) = merged_order {
            let semantic_only_budget = semantic_only_cap(category, strong_lexical);
            let mut semantic_only_used = 0;
            for merged in merged_order {
                if merged.category == MergeCategory::SemanticOnly {
                    if semantic_only_used >= semantic_only_budget {
                        continue;
                    }
                    semantic_only_used += 1;
                    let Some(item) = self.fts.get_item_by_id(merged.item_id)? else { continue };
                    let match_type = MatchClassifier::classify(&normalized, &item.name, &item.path, 2);
                    let mut breakdown = self.score_item(&normalized, &item, match_type, None, context, &structured)?;
                    let semantic_normalized = merged.semantic_normalized.unwrap_or(0.0);
                    breakdown.semantic_boost = semantic_normalized * self.config.scoring.semantic;
                    results.push(self.build_result(
                        &item,
                        match_type,
                        breakdown.total().max(merged.score),
                        "",
                        vec![],
                        semantic_normalized,
                    )?);
                } else if let Some((mut breakdown, hit, item)) = by_id.remove(&merged.item_id) {
                    let match_type = if hit.snippet.is_empty() {
                        MatchClassifier::classify(&normalized, &item.name, &item.path, 2)
                    } else {
                        MatchType::Content
                    };
                    let semantic_normalized = merged.semantic_normalized.unwrap_or(0.0);
                    breakdown.semantic_boost = semantic_normalized * self.config.scoring.semantic;
                    let (plain, highlights) = strip_snippet_tags(&hit.snippet);
                    results.push(self.build_result(&item, match_type, breakdown.total(), &plain, highlights, semantic_normalized)?);
                }
            }
        } else {
            for (_id, (breakdown, hit, item)) in by_id {
                let match_type =
                    if hit.snippet.is_empty() { MatchClassifier::classify(&normalized, &item.name, &item.path, 2) } else { MatchType::Content };
                let (plain, highlights) = strip_snippet_tags(&hit.snippet);
                results.push(self.build_result(&item, match_type, breakdown.total(), &plain, highlights, 0.0)?);
            }
        }

        self.apply_reranker_cascade(&normalized, &mut results)?;

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then(a.item_id.cmp(&b.item_id)));
        results.truncate(limit);
        Ok(results)
    }

    fn typo_correct(&self, normalized: &str) -> Option<String> {
        let mut corrected_tokens = Vec::new();
        let mut any_corrected = false;
        for token in normalized.split_whitespace() {
            match self.typo_lexicon.correct(token, 2) {
                Some(correction) => {
                    any_corrected = true;
                    corrected_tokens.push(correction.corrected);
                }
                None => corrected_tokens.push(token.to_string()),
            }
        }
        if any_corrected {
            Some(corrected_tokens.join(" "))
        } else {
            None
        }
    }

    fn score_item(
        &self,
        normalized_query: &str,
        item: &Item,
        match_type: MatchType,
        bm25_raw_score: Option<f64>,
        context: &QueryContext,
        structured: &StructuredQuery,
    ) -> Result<ScoreBreakdown> {
        let scorer = Scorer::new(&self.config.scoring);
        let now = crate::clock::now_unix();
        let days_since_modified = ((now - item.modified_at) / 86_400.0).max(0.0);
        let is_future_mtime = item.modified_at > now;

        let frequency = self.fts.get_frequency(item.id)?;

        let cwd_relative_depth = context.cwd_path.as_ref().and_then(|cwd| {
            if item.path.starts_with(cwd.as_str()) {
                let rel = item.path.trim_start_matches(cwd.as_str());
                Some(rel.matches('/').count())
            } else {
                None
            }
        });

        let app_context_match = context
            .frontmost_app_bundle_id
            .as_ref()
            .map(|bundle| app_context_allows(bundle, &item.ext))
            .unwrap_or(false);

        let inputs = ScoreInputs {
            match_type,
            bm25_raw_score,
            days_since_modified,
            is_future_mtime,
            open_count: frequency.open_count,
            cwd_relative_depth,
            app_context_match,
            pinned: item.pinned,
            path: item.path.clone(),
        };

        let mut breakdown = scorer.score(&inputs);

        if !structured.is_empty() {
            breakdown.structured_query_boost =
                structured_query::score(structured, item.modified_at, &item.name, &item.path, &self.config.scoring);
        }

        if let Some(prefs) = self.path_preferences {
            breakdown.feedback_boost += prefs.get_boost(&item.path)?;
        }
        if let Some(affinity) = self.type_affinity {
            breakdown.m2_signal_boost += affinity.get_boost(&item.path)?;
        }
        let tracker = InteractionTracker::new(self.fts);
        breakdown.feedback_boost += tracker.interaction_boost(normalized_query, item.id, self.config.feedback.path_preference_weight)?;

        Ok(breakdown)
    }

    fn merge_with_semantic(
        &self,
        normalized: &str,
        category: QueryCategory,
        strong_lexical: bool,
        lexical: &[LexicalCandidate],
    ) -> Result<Option<Vec<crate::search_merger::MergedResult>>> {
        let (Some(index), Some(store), Some(embedder)) = (self.vector_index, self.vector_store, &self.embedder) else {
            return Ok(None);
        };
        if index.is_empty() {
            return Ok(None);
        }

        // A failing embed or a corrupted/unloaded index degrades to lexical-only
        // rather than failing the whole search (§7: partial semantic-stage
        // failures fall back, they don't abort the query).
        let query_text = format!("query: {normalized}");
        let embeddings = match embedder.embed_batch(&[query_text]) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("semantic embedding failed, falling back to lexical-only: {e}");
                return Ok(None);
            }
        };
        let Some(query_vector) = embeddings.into_iter().next() else { return Ok(None) };

        let merge_config = adaptive_merge_config(category, strong_lexical, &self.config.merge);
        let neighbors = match index.search(&query_vector, self.config.limits.vector_k) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("vector index search failed, falling back to lexical-only: {e}");
                return Ok(None);
            }
        };

        let mut semantic = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            if let Some(item_id) = store.get_item_id(neighbor.label, "")? {
                let cosine_similarity = (1.0 - neighbor.distance as f64).clamp(-1.0, 1.0);
                semantic.push(SemanticCandidate { item_id, cosine_similarity });
            }
        }

        Ok(Some(SearchMerger::merge(lexical, &semantic, &merge_config)))
    }

    fn apply_reranker_cascade(&self, query: &str, results: &mut [SearchResult]) -> Result<()> {
        let Some(reranker) = self.reranker else { return Ok(()) };
        if !self.config.reranker.enabled || results.is_empty() {
            return Ok(());
        }

        let stage1: Vec<(i64, String)> =
            results.iter().take(self.config.reranker.stage1_max_candidates).map(|r| (r.item_id, r.snippet.clone())).collect();
        if let Ok(scores) = reranker.rerank(query, &stage1) {
            apply_stage_scores(results, &scores, self.config.reranker.stage1_weight);
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if is_ambiguous_top_k(results, self.config.reranker.ambiguity_margin_threshold) {
            let stage2: Vec<(i64, String)> =
                results.iter().take(self.config.reranker.stage2_max_candidates).map(|r| (r.item_id, r.snippet.clone())).collect();
            if let Ok(scores) = reranker.rerank(query, &stage2) {
                apply_stage_scores(results, &scores, self.config.reranker.stage2_weight);
            }
        }
        Ok(())
    }

    fn build_result(
        &self,
        item: &Item,
        match_type: MatchType,
        score: f64,
        snippet: &str,
        highlights: Vec<Highlight>,
        semantic_normalized: f64,
    ) -> Result<SearchResult> {
        let frequency = self.fts.get_frequency(item.id)?;
        Ok(SearchResult {
            item_id: item.id,
            path: item.path.clone(),
            name: item.name.clone(),
            kind: item.kind,
            match_type,
            score,
            snippet: snippet.to_string(),
            highlights,
            file_size: item.size,
            modification_date: item.modified_at,
            is_pinned: item.pinned,
            open_count: frequency.open_count,
            last_open_date: frequency.last_opened_at,
            semantic_normalized,
        })
    }
}

/// Mirrors the reference cascade's `isAmbiguousTopK`: a thin score margin
/// between the top two results, OR a top-10 split between strongly- and
/// weakly-semantic results (>=3 each side of the 0.55/0.12 bands).
fn is_ambiguous_top_k(results: &[SearchResult], margin_threshold: f64) -> bool {
    if results.len() < 2 {
        return false;
    }
    let margin = results[0].score - results[1].score;
    if margin < margin_threshold {
        return true;
    }

    let top_k = results.len().min(10);
    let mut high_semantic = 0;
    let mut low_semantic = 0;
    for result in &results[..top_k] {
        if result.semantic_normalized >= 0.55 {
            high_semantic += 1;
        } else if result.semantic_normalized <= 0.12 {
            low_semantic += 1;
        }
    }
    high_semantic >= 3 && low_semantic >= 3
}

fn apply_stage_scores(results: &mut [SearchResult], scores: &[(i64, f64)], weight: f64) {
    let lookup: std::collections::HashMap<i64, f64> = scores.iter().copied().collect();
    for result in results.iter_mut() {
        if let Some(rerank_score) = lookup.get(&result.item_id) {
            result.score = (result.score + rerank_score * weight).max(0.0);
        }
    }
}

/// Static per-bundle-id allow-list backing Scorer's `appContextBoost`
/// (§4.14). Kept here rather than in `scorer` since it is QueryPlanner's
/// responsibility to resolve the frontmost-app context into a yes/no.
fn app_context_allows(bundle_id: &str, ext: &str) -> bool {
    let code_exts = ["rs", "py", "js", "ts", "tsx", "jsx", "go", "c", "h", "cpp", "java", "rb", "sh"];
    let shell_exts = ["sh", "zsh", "bash", "toml", "yaml", "yml", "conf", "cfg"];
    let doc_exts = ["pdf", "md", "txt", "doc", "docx"];
    let image_exts = ["png", "jpg", "jpeg", "gif", "svg", "psd", "sketch"];
    let media_exts = ["mp3", "mp4", "wav", "mov", "mkv"];

    let bundle = bundle_id.to_lowercase();
    if bundle.contains("code") || bundle.contains("xcode") || bundle.contains("jetbrains") || bundle.contains("vim") {
        code_exts.contains(&ext)
    } else if bundle.contains("terminal") || bundle.contains("iterm") {
        shell_exts.contains(&ext)
    } else if bundle.contains("preview") || bundle.contains("acrobat") || bundle.contains("word") {
        doc_exts.contains(&ext)
    } else if bundle.contains("figma") || bundle.contains("sketch") || bundle.contains("photoshop") {
        image_exts.contains(&ext)
    } else if bundle.contains("quicktime") || bundle.contains("vlc") || bundle.contains("music") {
        media_exts.contains(&ext)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemKind, Sensitivity};

    fn seed(fts: &FtsStore, path: &str, name: &str, content: &str) -> i64 {
        let id = fts
            .upsert_item(path, name, "txt", ItemKind::Text, 10, 0.0, crate::clock::now_unix(), "", Sensitivity::Normal, "/", 0.0)
            .unwrap();
        fts.insert_chunks(id, name, path, &[("c1".into(), 0, content.into())]).unwrap();
        id
    }

    #[test]
    fn normalize_collapses_whitespace_and_strips_trailing_star() {
        assert_eq!(normalize("  Report   Q3* "), "report q3");
    }

    fn fake_result(item_id: i64, score: f64, semantic_normalized: f64) -> SearchResult {
        SearchResult {
            item_id,
            path: format!("/tmp/{item_id}.txt"),
            name: format!("{item_id}.txt"),
            kind: crate::types::ItemKind::Text,
            match_type: MatchType::Content,
            score,
            snippet: String::new(),
            highlights: vec![],
            file_size: 0,
            modification_date: 0.0,
            is_pinned: false,
            open_count: 0,
            last_open_date: 0.0,
            semantic_normalized,
        }
    }

    #[test]
    fn ambiguous_top_k_triggers_on_thin_margin() {
        let results = vec![fake_result(1, 100.0, 0.0), fake_result(2, 99.96, 0.0), fake_result(3, 99.10, 0.0)];
        assert!(is_ambiguous_top_k(&results, 0.08));
    }

    #[test]
    fn ambiguous_top_k_is_false_with_clear_margin_and_uniform_semantics() {
        let results = vec![fake_result(1, 100.0, 0.3), fake_result(2, 50.0, 0.3), fake_result(3, 10.0, 0.3)];
        assert!(!is_ambiguous_top_k(&results, 0.08));
    }

    #[test]
    fn ambiguous_top_k_triggers_on_semantic_split() {
        let mut results = Vec::new();
        for i in 0..10 {
            let semantic = if i < 3 { 0.9 } else if i < 6 { 0.02 } else { 0.3 };
            results.push(fake_result(i, 100.0 - i as f64 * 10.0, semantic));
        }
        assert!(is_ambiguous_top_k(&results, 0.08));
    }

    #[test]
    fn classify_short_query_is_ambiguous() {
        assert_eq!(classify_query("repo"), QueryCategory::ShortAmbiguous);
    }

    #[test]
    fn classify_path_like_query() {
        assert_eq!(classify_query("src/main.rs"), QueryCategory::PathOrCode);
    }

    #[test]
    fn search_returns_content_match() {
        let fts = FtsStore::open_in_memory().unwrap();
        seed(&fts, "/docs/notes.txt", "notes.txt", "byzantine fault tolerant consensus protocol");

        let config = Config::default();
        let lexicon = TypoLexicon::new(config.typo_lexicon.clone());
        let planner = QueryPlanner::new(&fts, &lexicon, &config);

        let results = planner.search("byzantine consensus", 10, &QueryContext::default()).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].path, "/docs/notes.txt");
    }

    #[test]
    fn search_applies_doc_type_intent_boost_to_matching_extension() {
        let fts = FtsStore::open_in_memory().unwrap();
        // Seeded txt first so it gets the lower item id and would win the
        // (score desc, itemId asc) tie-break absent the doc-type boost.
        seed(&fts, "/docs/acme-invoice.txt", "acme-invoice.txt", "acme quarterly invoice totals");
        seed(&fts, "/docs/acme-invoice.xlsx", "acme-invoice.xlsx", "acme quarterly invoice totals");

        let config = Config::default();
        let lexicon = TypoLexicon::new(config.typo_lexicon.clone());
        let planner = QueryPlanner::new(&fts, &lexicon, &config);

        let results = planner.search("acme invoice", 10, &QueryContext::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "/docs/acme-invoice.xlsx");
    }

    #[test]
    fn search_falls_back_to_name_fuzzy_when_no_fts_hits() {
        let fts = FtsStore::open_in_memory().unwrap();
        fts.upsert_item("/a/report.txt", "report.txt", "txt", ItemKind::Text, 10, 0.0, 0.0, "", Sensitivity::Normal, "/a", 0.0).unwrap();

        let config = Config::default();
        let lexicon = TypoLexicon::new(config.typo_lexicon.clone());
        let planner = QueryPlanner::new(&fts, &lexicon, &config);

        let results = planner.search("report", 10, &QueryContext::default()).unwrap();
        assert!(!results.is_empty());
    }
}
