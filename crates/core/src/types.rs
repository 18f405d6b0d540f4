//! Data model: the persisted entities (§3) and the in-memory work objects
//! that flow between pipeline stages.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Coarse content classification, driving extraction and scoring behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Directory,
    Text,
    Code,
    Markdown,
    Pdf,
    Image,
    Archive,
    Binary,
    Unknown,
}

impl ItemKind {
    pub fn is_extractable(self) -> bool {
        !matches!(self, ItemKind::Directory | ItemKind::Archive | ItemKind::Binary | ItemKind::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Directory => "directory",
            ItemKind::Text => "text",
            ItemKind::Code => "code",
            ItemKind::Markdown => "markdown",
            ItemKind::Pdf => "pdf",
            ItemKind::Image => "image",
            ItemKind::Archive => "archive",
            ItemKind::Binary => "binary",
            ItemKind::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "directory" => ItemKind::Directory,
            "text" => ItemKind::Text,
            "code" => ItemKind::Code,
            "markdown" => ItemKind::Markdown,
            "pdf" => ItemKind::Pdf,
            "image" => ItemKind::Image,
            "archive" => ItemKind::Archive,
            "binary" => ItemKind::Binary,
            _ => ItemKind::Unknown,
        }
    }

    /// Classify by extension (lowercase, no dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "rs" | "py" | "js" | "ts" | "tsx" | "jsx" | "go" | "c" | "h" | "cpp" | "hpp" | "cc" | "java" | "rb"
            | "sh" | "cs" | "swift" | "kt" | "php" => ItemKind::Code,
            "md" | "markdown" => ItemKind::Markdown,
            "pdf" => ItemKind::Pdf,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "svg" | "heic" => ItemKind::Image,
            "zip" | "tar" | "gz" | "tgz" | "7z" | "rar" | "xz" => ItemKind::Archive,
            "txt" | "log" | "csv" | "json" | "toml" | "yaml" | "yml" | "xml" | "ini" | "cfg" => ItemKind::Text,
            "" => ItemKind::Unknown,
            _ => ItemKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sensitivity {
    Normal,
    Sensitive,
    Hidden,
}

impl Sensitivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Sensitivity::Normal => "normal",
            Sensitivity::Sensitive => "sensitive",
            Sensitivity::Hidden => "hidden",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "sensitive" => Sensitivity::Sensitive,
            "hidden" => Sensitivity::Hidden,
            _ => Sensitivity::Normal,
        }
    }
}

/// Outcome of `PathRules::validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    Include,
    MetadataOnly,
    Exclude,
}

/// One indexed filesystem entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub ext: String,
    pub kind: ItemKind,
    pub size: u64,
    pub created_at: f64,
    pub modified_at: f64,
    pub indexed_at: f64,
    pub content_hash: String,
    pub sensitivity: Sensitivity,
    pub pinned: bool,
    pub parent_path: String,
}

/// One text fragment of an item, bounded by the chunker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub item_id: i64,
    pub chunk_index: usize,
    pub content: String,
    pub byte_offset: usize,
}

/// A hit returned from the FTS virtual table.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub item_id: i64,
    /// BM25 score in the embedded SQL engine's convention: non-positive,
    /// more negative is a stronger match.
    pub bm25_score: f64,
    /// Snippet with `<b>…</b>` highlight markers.
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMappingState {
    Active,
    Stale,
}

/// Weak reference tying an item to a label inside the ANN index, scoped to
/// a single embedding generation.
#[derive(Debug, Clone)]
pub struct VectorMapping {
    pub item_id: i64,
    pub hnsw_label: i64,
    pub model_id: String,
    pub generation_id: String,
    pub dimensions: usize,
    pub provider: String,
    pub passage_ordinal: i64,
    pub state: VectorMappingState,
    pub embedded_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationLifecycle {
    Building,
    Active,
    Retired,
}

#[derive(Debug, Clone)]
pub struct GenerationState {
    pub generation_id: String,
    pub model_id: String,
    pub dimensions: usize,
    pub provider: String,
    pub state: GenerationLifecycle,
    pub progress_pct: f64,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    ExactName,
    PrefixName,
    ContainsName,
    ExactPath,
    PrefixPath,
    Fuzzy,
    Content,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::ExactName => "exact_name",
            MatchType::PrefixName => "prefix_name",
            MatchType::ContainsName => "contains_name",
            MatchType::ExactPath => "exact_path",
            MatchType::PrefixPath => "prefix_path",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Content => "content",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Interaction {
    pub id: i64,
    pub normalized_query: String,
    pub item_id: i64,
    pub path: String,
    pub match_type: MatchType,
    pub result_position: usize,
    pub frontmost_app: Option<String>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Frequency {
    pub item_id: i64,
    pub open_count: u64,
    pub last_opened_at: f64,
    pub total_interactions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackAction {
    Open,
    Pin,
    Unpin,
}

impl FeedbackAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackAction::Open => "open",
            FeedbackAction::Pin => "pin",
            FeedbackAction::Unpin => "unpin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(FeedbackAction::Open),
            "pin" => Some(FeedbackAction::Pin),
            "unpin" => Some(FeedbackAction::Unpin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Feedback {
    pub id: i64,
    pub item_id: i64,
    pub action: FeedbackAction,
    pub query: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone)]
pub struct Failure {
    pub item_id: i64,
    pub stage: String,
    pub message: String,
    pub timestamp: f64,
}

/// The kind of in-memory work item flowing through the queue/scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkType {
    // Derives Ord in priority order (lowest = dispatched first).
    Delete,
    ModifiedContent,
    NewFile,
    RescanDirectory,
}

impl WorkType {
    /// Higher-priority type wins a coalescing merge (Delete beats
    /// ModifiedContent beats NewFile beats RescanDirectory).
    pub fn merge_rank(self) -> u8 {
        match self {
            WorkType::Delete => 0,
            WorkType::ModifiedContent => 1,
            WorkType::NewFile => 2,
            WorkType::RescanDirectory => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Live,
    Rebuild,
}

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub work_type: WorkType,
    pub path: PathBuf,
    pub known_size: Option<u64>,
    pub known_mtime: Option<f64>,
    pub retry_count: u32,
    pub lane: Lane,
    /// Path generation this item was stamped with by `PathStateActor`.
    /// Carried through the prep queue so the prep worker can pass it to
    /// `Indexer::prepare_work_item` unchanged (§4.5, §8 invariant 3).
    pub generation: u64,
}

impl WorkItem {
    pub fn new(work_type: WorkType, path: PathBuf, lane: Lane) -> Self {
        Self { work_type, path, known_size: None, known_mtime: None, retry_count: 0, lane, generation: 0 }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}

/// A failure captured during preparation, to be recorded by the writer.
#[derive(Debug, Clone)]
pub struct PreparedFailure {
    pub stage: String,
    pub message: String,
}

/// Result of `Indexer::prepare_work_item`. Transient; moves prep → writer.
#[derive(Debug, Clone)]
pub struct PreparedWork {
    pub work_type: WorkType,
    pub path: PathBuf,
    pub validation: ValidationResult,
    pub size: Option<u64>,
    pub created_at: Option<f64>,
    pub modified_at: Option<f64>,
    pub sensitivity: Sensitivity,
    pub kind: ItemKind,
    pub parent_path: String,
    pub content_hash: Option<String>,
    pub chunks: Vec<(usize, String, usize)>,
    pub extracted: bool,
    pub non_extractable: bool,
    pub failure: Option<PreparedFailure>,
    pub generation: u64,
    pub retry_count: u32,
    pub lane: Lane,
}

impl PreparedWork {
    pub fn name(&self) -> String {
        self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    pub fn ext(&self) -> String {
        self.path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Indexed,
    MetadataOnly,
    Deleted,
    Excluded,
    ExtractionFailed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct IndexResult {
    pub status: IndexStatus,
    pub chunks_inserted: usize,
    pub duration_ms: u64,
}
