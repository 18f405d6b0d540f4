//! Bucketed vocabulary for typo correction, built from the FTS vocabulary
//! table plus raw (unstemmed) filename tokens (§4.5).

use std::collections::HashMap;

use rusqlite::Connection;

use crate::config::TypoLexiconConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
struct Term {
    text: String,
    doc_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub corrected: String,
    pub edit_distance: usize,
    pub doc_count: i64,
}

pub struct TypoLexicon {
    config: TypoLexiconConfig,
    buckets: HashMap<char, Vec<Term>>,
    total_terms: usize,
    ready: bool,
}

fn adjacent_first_chars(c: char) -> Vec<char> {
    let lower = c.to_ascii_lowercase();
    let neighbors: &str = match lower {
        'a' => "qwsz",
        'b' => "vghn",
        'c' => "xdfv",
        'd' => "erfcxs",
        'e' => "rdsw",
        'f' => "rtgvcd",
        'g' => "tyhbvf",
        'h' => "yujnbg",
        'i' => "okju",
        'j' => "uikmnh",
        'k' => "iolmnj",
        'l' => "opk",
        'm' => "njk",
        'n' => "bhjm",
        'o' => "plki",
        'p' => "lo",
        'q' => "wa",
        'r' => "tfde",
        's' => "wedxza",
        't' => "ygfr",
        'u' => "ijhy",
        'v' => "cfgb",
        'w' => "qeas",
        'x' => "zsdc",
        'y' => "uhgt",
        'z' => "asx",
        _ => "",
    };
    let mut result = vec![lower];
    result.extend(neighbors.chars());
    result
}

fn compress_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last: Option<char> = None;
    for c in s.chars() {
        if Some(c) != last {
            out.push(c);
        }
        last = Some(c);
    }
    out
}

/// Optimal-string-alignment (restricted Damerau-Levenshtein) edit distance,
/// capped at `max_dist + 1` for early exit.
fn edit_distance(a: &[char], b: &[char], max_dist: usize) -> usize {
    let (a_len, b_len) = (a.len(), b.len());
    if a == b {
        return 0;
    }
    if a_len == 0 {
        return if b_len <= max_dist { b_len } else { max_dist + 1 };
    }
    if b_len == 0 {
        return if a_len <= max_dist { a_len } else { max_dist + 1 };
    }
    if a_len.abs_diff(b_len) > max_dist {
        return max_dist + 1;
    }

    let mut prev_prev = vec![0usize; b_len + 1];
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0usize; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        let mut row_min = curr[0];

        for j in 1..=b_len {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            let deletion = prev[j] + 1;
            let insertion = curr[j - 1] + 1;
            let substitution = prev[j - 1] + cost;
            curr[j] = deletion.min(insertion).min(substitution);

            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                curr[j] = curr[j].min(prev_prev[j - 2] + 1);
            }

            row_min = row_min.min(curr[j]);
        }

        if row_min > max_dist {
            return max_dist + 1;
        }

        std::mem::swap(&mut prev_prev, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    if prev[b_len] <= max_dist { prev[b_len] } else { max_dist + 1 }
}

impl TypoLexicon {
    pub fn new(config: TypoLexiconConfig) -> Self {
        Self { config, buckets: HashMap::new(), total_terms: 0, ready: false }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn term_count(&self) -> usize {
        self.total_terms
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.total_terms = 0;
        self.ready = false;
    }

    /// Build the lexicon from `search_index_fts`'s vocabulary table, then
    /// augment it with unstemmed filename words from `items`.
    pub fn build(&mut self, conn: &Connection) -> Result<()> {
        self.clear();

        conn.execute_batch(
            "CREATE VIRTUAL TABLE IF NOT EXISTS search_index_vocab \
             USING fts5vocab(search_index_fts, 'row');",
        )?;

        {
            let mut stmt =
                conn.prepare("SELECT term, doc FROM search_index_vocab ORDER BY doc DESC")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                if self.total_terms >= self.config.max_total_terms {
                    break;
                }
                let term: String = row.get(0)?;
                let doc: i64 = row.get(1)?;
                let term = term.to_lowercase();
                if term.chars().count() < self.config.min_term_length {
                    continue;
                }
                let bucket_key = term.chars().next().unwrap();
                let bucket = self.buckets.entry(bucket_key).or_default();
                if bucket.len() >= self.config.max_terms_per_bucket {
                    continue;
                }
                bucket.push(Term { text: term, doc_count: doc });
                self.total_terms += 1;
            }
        }

        let mut existing: std::collections::HashSet<String> = std::collections::HashSet::new();
        for bucket in self.buckets.values() {
            for t in bucket {
                existing.insert(t.text.clone());
            }
        }

        let mut stmt =
            conn.prepare("SELECT DISTINCT name FROM items WHERE name IS NOT NULL AND name != ''")?;
        let mut rows = stmt.query([])?;
        let mut filename_terms = 0usize;
        'outer: while let Some(row) = rows.next()? {
            if filename_terms >= self.config.max_filename_terms {
                break;
            }
            let name: String = row.get(0)?;
            for word in name.split(|c: char| !c.is_ascii_alphanumeric()) {
                if word.is_empty() {
                    continue;
                }
                let lower = word.to_lowercase();
                if lower.chars().count() < self.config.min_term_length {
                    continue;
                }
                if existing.contains(&lower) {
                    continue;
                }
                if filename_terms >= self.config.max_filename_terms {
                    break 'outer;
                }
                let bucket_key = lower.chars().next().unwrap();
                self.buckets.entry(bucket_key).or_default().push(Term { text: lower.clone(), doc_count: 1 });
                existing.insert(lower);
                self.total_terms += 1;
                filename_terms += 1;
            }
        }

        self.ready = true;
        Ok(())
    }

    pub fn contains(&self, token: &str) -> bool {
        if !self.ready || token.chars().count() < self.config.min_term_length {
            return false;
        }
        let normalized = token.to_lowercase();
        let Some(first) = normalized.chars().next() else { return false };
        self.buckets.get(&first).map(|b| b.iter().any(|t| t.text == normalized)).unwrap_or(false)
    }

    /// Find the best correction for `token`. `max_distance` should be 1 for
    /// tokens under 8 chars, 2 for longer tokens.
    pub fn correct(&self, token: &str, max_distance: usize) -> Option<Correction> {
        if !self.ready || token.chars().count() < self.config.min_term_length {
            return None;
        }
        let normalized = token.to_lowercase();
        let norm_chars: Vec<char> = normalized.chars().collect();
        if norm_chars.is_empty() {
            return None;
        }

        let keys = adjacent_first_chars(norm_chars[0]);
        let mut best: Option<Correction> = None;

        for key in &keys {
            let Some(bucket) = self.buckets.get(key) else { continue };
            for candidate in bucket {
                let cand_chars: Vec<char> = candidate.text.chars().collect();
                if cand_chars.len().abs_diff(norm_chars.len()) > max_distance {
                    continue;
                }
                let dist = edit_distance(&norm_chars, &cand_chars, max_distance);
                if dist > max_distance {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some(b) => dist < b.edit_distance || (dist == b.edit_distance && candidate.doc_count > b.doc_count),
                };
                if better {
                    best = Some(Correction { corrected: candidate.text.clone(), edit_distance: dist, doc_count: candidate.doc_count });
                }
            }
        }

        if best.is_some() {
            return best;
        }

        // Fall back to double-letter-compressed matching, e.g. "acommodate" -> "acomodate".
        let compressed_input = compress_runs(&normalized);
        let compressed_chars: Vec<char> = compressed_input.chars().collect();
        for key in &keys {
            let Some(bucket) = self.buckets.get(key) else { continue };
            for candidate in bucket {
                let compressed_candidate = compress_runs(&candidate.text);
                let cand_chars: Vec<char> = compressed_candidate.chars().collect();
                if cand_chars.len().abs_diff(compressed_chars.len()) > max_distance {
                    continue;
                }
                let dist = edit_distance(&compressed_chars, &cand_chars, max_distance);
                if dist > max_distance {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some(b) => dist < b.edit_distance || (dist == b.edit_distance && candidate.doc_count > b.doc_count),
                };
                if better {
                    best = Some(Correction { corrected: candidate.text.clone(), edit_distance: dist, doc_count: candidate.doc_count });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE VIRTUAL TABLE search_index_fts USING fts5(path, name, content);
             CREATE TABLE items(id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO search_index_fts(path, name, content) VALUES ('/a/report.txt', 'report', 'quarterly report content');
             INSERT INTO search_index_fts(path, name, content) VALUES ('/b/budget.txt', 'budget', 'budget spreadsheet numbers');
             INSERT INTO items(name) VALUES ('Braeking.md');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn builds_and_reports_ready() {
        let conn = seeded_conn();
        let mut lex = TypoLexicon::new(TypoLexiconConfig::default());
        lex.build(&conn).unwrap();
        assert!(lex.is_ready());
        assert!(lex.term_count() > 0);
    }

    #[test]
    fn contains_exact_term() {
        let conn = seeded_conn();
        let mut lex = TypoLexicon::new(TypoLexiconConfig::default());
        lex.build(&conn).unwrap();
        assert!(lex.contains("report"));
        assert!(!lex.contains("zzzznotaterm"));
    }

    #[test]
    fn corrects_single_edit_typo() {
        let conn = seeded_conn();
        let mut lex = TypoLexicon::new(TypoLexiconConfig::default());
        lex.build(&conn).unwrap();
        let correction = lex.correct("reprot", 2);
        assert!(correction.is_some());
        assert_eq!(correction.unwrap().corrected, "report");
    }

    #[test]
    fn unstemmed_filename_terms_are_augmented() {
        let conn = seeded_conn();
        let mut lex = TypoLexicon::new(TypoLexiconConfig::default());
        lex.build(&conn).unwrap();
        assert!(lex.contains("braeking"));
    }

    #[test]
    fn edit_distance_handles_transposition() {
        let a: Vec<char> = "ab".chars().collect();
        let b: Vec<char> = "ba".chars().collect();
        assert_eq!(edit_distance(&a, &b, 2), 1);
    }

    #[test]
    fn not_ready_before_build_returns_none() {
        let lex = TypoLexicon::new(TypoLexiconConfig::default());
        assert_eq!(lex.correct("report", 1), None);
        assert!(!lex.contains("report"));
    }
}
