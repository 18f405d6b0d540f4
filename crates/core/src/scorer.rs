//! Per-candidate scoring and match classification (§4.14).

use crate::config::ScoringWeights;
use crate::types::MatchType;

/// Junk infixes that earn a `junkPenalty`, kept close to `path_rules`'s
/// default exclusions but independent of them (a file can be indexed and
/// still live under a junk-ish path, e.g. via an explicit `.bsignore`
/// override).
const JUNK_INFIXES: &[&str] =
    &["node_modules/", "__pycache__/", ".git/", "target/debug/", "target/release/", "dist/", "build/", ".venv/"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreBreakdown {
    pub base_match: f64,
    pub recency_boost: f64,
    pub frequency_boost: f64,
    pub context_boost: f64,
    pub pinned_boost: f64,
    pub junk_penalty: f64,
    pub semantic_boost: f64,
    pub structured_query_boost: f64,
    pub feedback_boost: f64,
    pub m2_signal_boost: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        let sum = self.base_match
            + self.recency_boost
            + self.frequency_boost
            + self.context_boost
            + self.pinned_boost
            + self.semantic_boost
            + self.structured_query_boost
            + self.feedback_boost
            + self.m2_signal_boost
            - self.junk_penalty;
        sum.max(0.0)
    }
}

/// Inputs a `Scorer` needs per candidate; everything QueryPlanner already
/// knows about an item plus the static request context.
#[derive(Debug, Clone)]
pub struct ScoreInputs {
    pub match_type: MatchType,
    pub bm25_raw_score: Option<f64>,
    pub days_since_modified: f64,
    pub is_future_mtime: bool,
    pub open_count: u64,
    pub cwd_relative_depth: Option<usize>,
    pub app_context_match: bool,
    pub pinned: bool,
    pub path: String,
}

pub struct Scorer<'a> {
    weights: &'a ScoringWeights,
    cwd_max_depth: usize,
}

impl<'a> Scorer<'a> {
    pub fn new(weights: &'a ScoringWeights) -> Self {
        Self { weights, cwd_max_depth: 2 }
    }

    pub fn score(&self, inputs: &ScoreInputs) -> ScoreBreakdown {
        let mut breakdown = ScoreBreakdown::default();

        breakdown.base_match = match inputs.match_type {
            MatchType::ExactName => self.weights.exact_name,
            MatchType::PrefixName => self.weights.prefix_name,
            MatchType::ContainsName => self.weights.contains_name,
            MatchType::ExactPath => self.weights.exact_path,
            MatchType::PrefixPath => self.weights.prefix_path,
            MatchType::Fuzzy => self.weights.fuzzy,
            MatchType::Content => inputs.bm25_raw_score.unwrap_or(0.0).abs() * self.weights.content_coefficient,
        };

        breakdown.recency_boost = if inputs.is_future_mtime {
            self.weights.recency
        } else {
            self.weights.recency * (-inputs.days_since_modified / self.weights.recency_decay_days).exp()
        };

        breakdown.frequency_boost = match inputs.open_count {
            0 => 0.0,
            1..=5 => self.weights.frequency_tier1,
            6..=20 => self.weights.frequency_tier2,
            _ => self.weights.frequency_tier3,
        };

        let mut context = 0.0;
        if let Some(depth) = inputs.cwd_relative_depth {
            if depth <= self.cwd_max_depth {
                let decay = 1.0 - (depth as f64 / (self.cwd_max_depth + 1) as f64);
                context += self.weights.cwd_boost * decay;
            }
        }
        if inputs.app_context_match {
            context += self.weights.app_context_boost;
        }
        breakdown.context_boost = context;

        breakdown.pinned_boost = if inputs.pinned { self.weights.pinned_boost } else { 0.0 };

        breakdown.junk_penalty = if JUNK_INFIXES.iter().any(|infix| inputs.path.contains(infix)) {
            self.weights.junk_penalty
        } else {
            0.0
        };

        breakdown
    }
}

/// Scored candidate, ready for the final sort.
#[derive(Debug, Clone)]
pub struct RankedCandidate<T> {
    pub item_id: i64,
    pub breakdown: ScoreBreakdown,
    pub payload: T,
}

/// Sorts by `(score desc, itemId asc)` for a deterministic tie-break.
pub fn rank_results<T>(mut candidates: Vec<RankedCandidate<T>>) -> Vec<RankedCandidate<T>> {
    candidates.sort_by(|a, b| {
        b.breakdown.total().partial_cmp(&a.breakdown.total()).unwrap_or(std::cmp::Ordering::Equal).then(a.item_id.cmp(&b.item_id))
    });
    candidates
}

/// Restricted Damerau-Levenshtein edit distance, used only for
/// `MatchClassifier::classify`'s Fuzzy check (independent of
/// `typo_lexicon`'s OSA implementation, which is tuned for vocabulary
/// lookups rather than filename comparison).
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

pub struct MatchClassifier;

impl MatchClassifier {
    /// `query`, `file_name`, `file_path` are compared case-insensitively.
    /// Name comparisons strip the extension unless the filename starts with
    /// a literal dot.
    pub fn classify(query: &str, file_name: &str, file_path: &str, fuzzy_threshold: usize) -> MatchType {
        let query = query.to_lowercase();
        let file_name_lower = file_name.to_lowercase();
        let file_path_lower = file_path.to_lowercase();

        let basename = if file_name_lower.starts_with('.') {
            file_name_lower.clone()
        } else {
            match file_name_lower.rfind('.') {
                Some(idx) if idx > 0 => file_name_lower[..idx].to_string(),
                _ => file_name_lower.clone(),
            }
        };

        if basename == query {
            return MatchType::ExactName;
        }
        if basename.starts_with(&query) {
            return MatchType::PrefixName;
        }
        if basename.contains(&query) {
            return MatchType::ContainsName;
        }
        if file_path_lower == query {
            return MatchType::ExactPath;
        }
        if file_path_lower.starts_with(&query) {
            return MatchType::PrefixPath;
        }
        if levenshtein(&query, &basename) <= fuzzy_threshold {
            return MatchType::Fuzzy;
        }
        MatchType::Content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> ScoringWeights {
        ScoringWeights::default()
    }

    #[test]
    fn base_match_picks_table_value() {
        let w = weights();
        let scorer = Scorer::new(&w);
        let inputs = ScoreInputs {
            match_type: MatchType::ExactName,
            bm25_raw_score: None,
            days_since_modified: 0.0,
            is_future_mtime: false,
            open_count: 0,
            cwd_relative_depth: None,
            app_context_match: false,
            pinned: false,
            path: "/home/user/doc.txt".into(),
        };
        let breakdown = scorer.score(&inputs);
        assert_eq!(breakdown.base_match, 200.0);
    }

    #[test]
    fn content_match_scales_by_bm25() {
        let w = weights();
        let scorer = Scorer::new(&w);
        let inputs = ScoreInputs {
            match_type: MatchType::Content,
            bm25_raw_score: Some(-4.0),
            days_since_modified: 0.0,
            is_future_mtime: false,
            open_count: 0,
            cwd_relative_depth: None,
            app_context_match: false,
            pinned: false,
            path: "/home/user/doc.txt".into(),
        };
        let breakdown = scorer.score(&inputs);
        assert_eq!(breakdown.base_match, 4.0);
    }

    #[test]
    fn junk_penalty_can_zero_out_total() {
        let w = weights();
        let scorer = Scorer::new(&w);
        let inputs = ScoreInputs {
            match_type: MatchType::Fuzzy,
            bm25_raw_score: None,
            days_since_modified: 400.0,
            is_future_mtime: false,
            open_count: 0,
            cwd_relative_depth: None,
            app_context_match: false,
            pinned: false,
            path: "/repo/node_modules/pkg/index.js".into(),
        };
        let breakdown = scorer.score(&inputs);
        assert_eq!(breakdown.total(), 0.0);
    }

    #[test]
    fn pinned_boost_applies() {
        let w = weights();
        let scorer = Scorer::new(&w);
        let inputs = ScoreInputs {
            match_type: MatchType::ContainsName,
            bm25_raw_score: None,
            days_since_modified: 0.0,
            is_future_mtime: false,
            open_count: 0,
            cwd_relative_depth: None,
            app_context_match: false,
            pinned: true,
            path: "/home/user/doc.txt".into(),
        };
        let breakdown = scorer.score(&inputs);
        assert_eq!(breakdown.pinned_boost, 200.0);
    }

    #[test]
    fn rank_results_orders_by_score_then_id() {
        let low = RankedCandidate { item_id: 2, breakdown: ScoreBreakdown { base_match: 10.0, ..Default::default() }, payload: () };
        let high_a = RankedCandidate { item_id: 5, breakdown: ScoreBreakdown { base_match: 50.0, ..Default::default() }, payload: () };
        let high_b = RankedCandidate { item_id: 1, breakdown: ScoreBreakdown { base_match: 50.0, ..Default::default() }, payload: () };

        let ranked = rank_results(vec![low, high_a, high_b]);
        assert_eq!(ranked[0].item_id, 1);
        assert_eq!(ranked[1].item_id, 5);
        assert_eq!(ranked[2].item_id, 2);
    }

    #[test]
    fn classifier_matches_exact_and_fuzzy() {
        assert_eq!(MatchClassifier::classify("report", "report.pdf", "/a/report.pdf", 2), MatchType::ExactName);
        assert_eq!(MatchClassifier::classify("reprot", "report.pdf", "/a/report.pdf", 2), MatchType::Fuzzy);
        assert_eq!(MatchClassifier::classify(".env", ".env", "/a/.env", 2), MatchType::ExactName);
    }
}
