//! Reciprocal-rank fusion between the lexical (FTS5) and semantic (HNSW)
//! candidate streams (§4.13).

use std::collections::HashMap;

use crate::config::MergeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeCategory {
    LexicalOnly,
    SemanticOnly,
    Both,
}

/// One candidate entering the merge, already ranked within its own stream.
#[derive(Debug, Clone)]
pub struct LexicalCandidate {
    pub item_id: i64,
    pub raw_score: f64,
}

#[derive(Debug, Clone)]
pub struct SemanticCandidate {
    pub item_id: i64,
    pub cosine_similarity: f64,
}

#[derive(Debug, Clone)]
pub struct MergedResult {
    pub item_id: i64,
    pub score: f64,
    pub category: MergeCategory,
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
    /// Normalized semantic similarity (`normalize_semantic_score`), `None`
    /// when the item had no semantic hit. QueryPlanner turns this into the
    /// `semanticBoost` it adds after the merge (§4.15 step 9).
    pub semantic_normalized: Option<f64>,
}

/// `score / maxScore`, clamped to 0 when `maxScore <= 0`.
pub fn normalize_lexical_score(score: f64, max_score: f64) -> f64 {
    if max_score <= 0.0 {
        0.0
    } else {
        (score / max_score).clamp(0.0, 1.0)
    }
}

/// `(cosineSim - threshold) / (1 - threshold)`, clamped to `[0,1]`; 0 below
/// the threshold.
pub fn normalize_semantic_score(cosine_sim: f64, threshold: f64) -> f64 {
    if cosine_sim < threshold || threshold >= 1.0 {
        return 0.0;
    }
    ((cosine_sim - threshold) / (1.0 - threshold)).clamp(0.0, 1.0)
}

pub struct SearchMerger;

impl SearchMerger {
    /// `lexical` and `semantic` must already be sorted best-first within
    /// their own stream — rank is assigned positionally (1-based).
    pub fn merge(lexical: &[LexicalCandidate], semantic: &[SemanticCandidate], config: &MergeConfig) -> Vec<MergedResult> {
        let mut lexical_rank: HashMap<i64, usize> = HashMap::new();
        for (i, c) in lexical.iter().enumerate() {
            lexical_rank.entry(c.item_id).or_insert(i + 1);
        }

        let mut semantic_rank: HashMap<i64, usize> = HashMap::new();
        let mut semantic_norm: HashMap<i64, f64> = HashMap::new();
        for (i, c) in semantic.iter().enumerate() {
            semantic_rank.entry(c.item_id).or_insert(i + 1);
            semantic_norm
                .entry(c.item_id)
                .or_insert_with(|| normalize_semantic_score(c.cosine_similarity, config.similarity_threshold));
        }

        let mut all_ids: Vec<i64> = lexical_rank.keys().chain(semantic_rank.keys()).copied().collect();
        all_ids.sort_unstable();
        all_ids.dedup();

        let mut merged = Vec::with_capacity(all_ids.len());
        for item_id in all_ids {
            let lrank = lexical_rank.get(&item_id).copied();
            let srank = semantic_rank.get(&item_id).copied();

            let category = match (lrank, srank) {
                (Some(_), Some(_)) => MergeCategory::Both,
                (Some(_), None) => MergeCategory::LexicalOnly,
                (None, Some(_)) => MergeCategory::SemanticOnly,
                (None, None) => continue,
            };

            let lexical_component = lrank.map(|r| config.lexical_weight / (config.rrf_k + r as f64)).unwrap_or(0.0);
            let semantic_component = srank.map(|r| config.semantic_weight / (config.rrf_k + r as f64)).unwrap_or(0.0);
            let score = lexical_component + semantic_component;

            if category == MergeCategory::SemanticOnly {
                let norm = semantic_norm.get(&item_id).copied().unwrap_or(0.0);
                if norm <= 0.0 || score <= 0.0 {
                    continue;
                }
            }

            let semantic_normalized = srank.map(|_| semantic_norm.get(&item_id).copied().unwrap_or(0.0));
            merged.push(MergedResult { item_id, score, category, lexical_rank: lrank, semantic_rank: srank, semantic_normalized });
        }

        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then(a.item_id.cmp(&b.item_id)));
        merged.truncate(config.max_results);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MergeConfig {
        MergeConfig { lexical_weight: 0.6, semantic_weight: 0.4, similarity_threshold: 0.7, rrf_k: 60.0, max_results: 20 }
    }

    #[test]
    fn normalizes_lexical_score() {
        assert_eq!(normalize_lexical_score(5.0, 10.0), 0.5);
        assert_eq!(normalize_lexical_score(5.0, 0.0), 0.0);
    }

    #[test]
    fn normalizes_semantic_score_below_threshold_is_zero() {
        assert_eq!(normalize_semantic_score(0.5, 0.7), 0.0);
        assert!(normalize_semantic_score(0.85, 0.7) > 0.0);
    }

    #[test]
    fn both_category_outranks_single_stream() {
        let lexical = vec![LexicalCandidate { item_id: 1, raw_score: 10.0 }, LexicalCandidate { item_id: 2, raw_score: 5.0 }];
        let semantic = vec![SemanticCandidate { item_id: 1, cosine_similarity: 0.9 }, SemanticCandidate { item_id: 3, cosine_similarity: 0.95 }];

        let merged = SearchMerger::merge(&lexical, &semantic, &config());
        assert_eq!(merged[0].item_id, 1);
        assert_eq!(merged[0].category, MergeCategory::Both);
    }

    #[test]
    fn semantic_only_below_threshold_dropped() {
        let lexical = vec![];
        let semantic = vec![SemanticCandidate { item_id: 9, cosine_similarity: 0.5 }];
        let merged = SearchMerger::merge(&lexical, &semantic, &config());
        assert!(merged.is_empty());
    }

    #[test]
    fn stable_tie_break_by_item_id() {
        let lexical = vec![LexicalCandidate { item_id: 5, raw_score: 1.0 }, LexicalCandidate { item_id: 2, raw_score: 1.0 }];
        let semantic = vec![];
        let merged = SearchMerger::merge(&lexical, &semantic, &config());
        // Equal rank contribution from raw_score isn't possible here since rank
        // (not raw_score) drives the RRF term, so rank 1 (item 5) scores
        // higher than rank 2 (item 2); assert deterministic ordering instead.
        assert_eq!(merged.len(), 2);
        assert!(merged[0].score >= merged[1].score);
    }

    #[test]
    fn truncates_to_max_results() {
        let lexical: Vec<_> = (0..30).map(|i| LexicalCandidate { item_id: i, raw_score: 100.0 - i as f64 }).collect();
        let mut cfg = config();
        cfg.max_results = 5;
        let merged = SearchMerger::merge(&lexical, &[], &cfg);
        assert_eq!(merged.len(), 5);
    }
}
