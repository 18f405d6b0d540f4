//! Decides Include / MetadataOnly / Exclude for a path (§4.1).
//!
//! Evaluation order, first match wins: user `.bsignore` glob, built-in
//! exclusion, cloud artifact, hidden (non-allow-listed dot directory),
//! sensitive directory, size cap, otherwise Include.

use std::path::Path;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{Sensitivity, ValidationResult};

/// Directories that look hidden (dot-prefixed) but are dev-toolchain roots
/// we still want to index normally. Sensitive dot-dirs are included here too
/// so they fall through to `is_sensitive_path` instead of being excluded.
const ALLOWED_DOT_DIRS: &[&str] = &[
    ".config/",
    ".local/",
    ".cargo/",
    ".rustup/",
    ".npm/",
    ".nvm/",
    ".pyenv/",
    ".rbenv/",
    ".sdkman/",
    ".gradle/",
    ".m2/",
    ".docker/",
    ".kube/",
    ".terraform.d/",
    ".bundle/",
    ".ssh/",
    ".gnupg/",
    ".gpg/",
    ".aws/",
];

const SENSITIVE_PATTERNS: &[&str] =
    &[".ssh/", ".gnupg/", ".gpg/", ".aws/", "Library/Preferences/", "Library/Keychains/"];

const DEFAULT_EXCLUSIONS: &[&str] = &[
    // Version control internals
    ".git/objects/**",
    ".git/hooks/**",
    ".git/refs/**",
    ".git/logs/**",
    ".git/info/**",
    ".git/packed-refs",
    ".git/COMMIT_EDITMSG",
    ".git/MERGE_MSG",
    ".git/index",
    // Node / JS
    "node_modules/**",
    ".yarn/cache/**",
    ".next/**",
    ".nuxt/**",
    "bower_components/**",
    // Build outputs
    "dist/**",
    "build/**",
    "DerivedData/**",
    "cmake-build-*/**",
    // Python
    "__pycache__/**",
    ".tox/**",
    "*.pyc",
    "*.pyo",
    ".eggs/**",
    "*.egg-info/**",
    // Rust / Cargo
    ".cargo/**",
    "target/release/**",
    "target/debug/**",
    // Virtual environments
    "venv/**",
    ".venv/**",
    // Vendor / dependencies
    "vendor/**",
    // macOS system
    "Library/Caches/**",
    "Library/Containers/**",
    "Library/Group Containers/**",
    "Library/Developer/**",
    "Library/Logs/**",
    "Library/Mail/**",
    "Library/Messages/**",
    "Library/Saved Application State/**",
    "Library/Application Support/AddressBook/**",
    "Library/Application Support/CallHistoryDB/**",
    "Library/Application Support/MobileSync/**",
    "Library/Application Support/com.apple.*/**",
    ".DS_Store",
    ".localized",
    "._*",
    ".TemporaryItems/**",
    ".Trashes/**",
    ".fseventsd/**",
    ".Spotlight-V100/**",
    "Thumbs.db",
    // Cloud sync artifacts
    ".dropbox.cache/**",
    ".dropbox/",
    // Cloud temp files
    "Icon\r",
    ".gdoc.tmp",
    ".gsheet.tmp",
    // IDE / editor
    ".idea/**",
    ".vscode/**",
    "*.swp",
    "*.swo",
    "*~",
];

/// Glob matcher supporting `*`, `**`, and `?`. `**` matches any number of
/// path components (including none); `*` does not cross a `/`.
fn match_glob_impl(pattern: &[u8], path: &[u8]) -> bool {
    match (pattern.first(), path.first()) {
        (Some(b'*'), _) if pattern.get(1) == Some(&b'*') => {
            let mut rest = &pattern[2..];
            if rest.first() == Some(&b'/') {
                rest = &rest[1..];
            }
            if rest.is_empty() {
                return true;
            }
            for i in 0..=path.len() {
                if match_glob_impl(rest, &path[i..]) {
                    return true;
                }
            }
            false
        }
        (Some(b'*'), _) => {
            let rest = &pattern[1..];
            if rest.is_empty() {
                return !path.contains(&b'/');
            }
            for i in 0..path.len() {
                if path[i] == b'/' {
                    break;
                }
                if match_glob_impl(rest, &path[i..]) {
                    return true;
                }
            }
            match_glob_impl(rest, path)
        }
        (Some(b'?'), Some(c)) => {
            if *c == b'/' {
                false
            } else {
                match_glob_impl(&pattern[1..], &path[1..])
            }
        }
        (Some(pc), Some(c)) if pc == c => match_glob_impl(&pattern[1..], &path[1..]),
        (Some(_), _) => false,
        (None, _) => {
            // Trailing `*`s in the pattern match the (possibly empty) rest.
            path.is_empty()
        }
    }
}

/// Match a single pattern against a path. Patternless-of-`/` patterns match
/// any path component; patterns containing `/` match against any path
/// suffix starting at a component boundary (so `**/x/**` matches any
/// ancestor/descendant).
fn match_glob(pattern: &str, path: &str) -> bool {
    let pattern = pattern.as_bytes();
    let path = path.as_bytes();

    if !pattern.contains(&b'/') {
        for component in path_components(path) {
            if match_glob_impl(pattern, component) {
                return true;
            }
        }
        return false;
    }

    if match_glob_impl(pattern, path) {
        return true;
    }
    let mut pos = 0;
    while let Some(slash) = find(&path[pos..], b'/') {
        pos += slash + 1;
        if pos < path.len() && match_glob_impl(pattern, &path[pos..]) {
            return true;
        }
    }
    false
}

fn find(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

fn path_components(path: &[u8]) -> impl Iterator<Item = &[u8]> {
    path.split(|&b| b == b'/').filter(|c| !c.is_empty())
}

/// A single `.bsignore` pattern loaded from the user's ignore file.
#[derive(Debug, Clone)]
struct IgnoreFile {
    patterns: Vec<String>,
    loaded_at_ms: u64,
}

impl IgnoreFile {
    fn empty() -> Self {
        Self { patterns: Vec::new(), loaded_at_ms: 0 }
    }

    fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let patterns = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        let loaded_at_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
        Ok(Self { patterns, loaded_at_ms })
    }
}

/// Decides Include / MetadataOnly / Exclude for a path. Cheap to construct;
/// holds the reloadable `.bsignore` pattern set behind a lock.
pub struct PathRules {
    max_file_size: u64,
    ignore: RwLock<IgnoreFile>,
    ignore_path: Option<std::path::PathBuf>,
}

impl Default for PathRules {
    fn default() -> Self {
        Self { max_file_size: 5 * 1024 * 1024 * 1024, ignore: RwLock::new(IgnoreFile::empty()), ignore_path: None }
    }
}

impl PathRules {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size, ..Self::default() }
    }

    /// Load (or reload) the `.bsignore` file. Returns the number of
    /// patterns loaded, or an error if the file can't be read.
    pub fn load_bsignore(&mut self, path: &Path) -> std::io::Result<usize> {
        let ignore = IgnoreFile::load(path)?;
        let count = ignore.patterns.len();
        self.ignore_path = Some(path.to_path_buf());
        *self.ignore.write().unwrap() = ignore;
        tracing::info!(path = %path.display(), patterns = count, "loaded .bsignore");
        Ok(count)
    }

    pub fn ignore_pattern_count(&self) -> usize {
        self.ignore.read().unwrap().patterns.len()
    }

    pub fn ignore_loaded_at_ms(&self) -> u64 {
        self.ignore.read().unwrap().loaded_at_ms
    }

    pub fn ignore_path(&self) -> Option<&Path> {
        self.ignore_path.as_deref()
    }

    fn matches_user_ignore(&self, path: &str) -> bool {
        let ignore = self.ignore.read().unwrap();
        ignore.patterns.iter().any(|p| match_glob(p, path))
    }

    fn matches_default_exclusion(&self, path: &str) -> bool {
        DEFAULT_EXCLUSIONS.iter().any(|p| match_glob(p, path))
    }

    fn is_hidden_path(&self, path: &str) -> bool {
        let components: Vec<&str> = path.split('/').collect();
        // Skip the final (filename) component — only directories count.
        for component in components.iter().take(components.len().saturating_sub(1)) {
            if component.is_empty() || !component.starts_with('.') {
                continue;
            }
            let mut pattern = component.to_string();
            pattern.push('/');
            if !ALLOWED_DOT_DIRS.contains(&pattern.as_str()) {
                return true;
            }
        }
        false
    }

    fn is_sensitive_path(&self, path: &str) -> bool {
        SENSITIVE_PATTERNS.iter().any(|p| path.contains(p))
    }

    pub fn classify_sensitivity(&self, path: &str) -> Sensitivity {
        if self.is_sensitive_path(path) {
            Sensitivity::Sensitive
        } else if self.is_hidden_path(path) {
            Sensitivity::Hidden
        } else {
            Sensitivity::Normal
        }
    }

    pub fn is_cloud_folder(&self, path: &str) -> bool {
        path.contains("Dropbox/")
            || path.contains("Dropbox\\")
            || path.contains("Google Drive/")
            || path.contains("GoogleDrive/")
            || path.contains("My Drive/")
            || path.contains("OneDrive/")
            || path.contains("OneDrive -")
            || path.contains("iCloud Drive/")
            || path.contains("Mobile Documents/")
    }

    pub fn is_cloud_artifact(&self, path: &str) -> bool {
        let basename = path.rsplit('/').next().unwrap_or(path);
        if path.contains(".dropbox.cache/") {
            return true;
        }
        if basename == ".dropbox" || basename == ".dropbox-dist" {
            return true;
        }
        if path.contains(".~google-drive-root") {
            return true;
        }
        if basename == ".gdoc.tmp" || basename == ".gsheet.tmp" {
            return true;
        }
        if path.contains("OneDrive_folder_placeholder.ini") {
            return true;
        }
        if path.contains(".icloud_folder_attributes.plist") {
            return true;
        }
        if basename.ends_with(".icloud") && path.contains("Mobile Documents/") {
            return true;
        }
        false
    }

    /// Validate a path (with optional known size) against all rules.
    pub fn validate(&self, path: &str, size: Option<u64>) -> ValidationResult {
        if self.matches_user_ignore(path) {
            return ValidationResult::Exclude;
        }
        if self.matches_default_exclusion(path) {
            return ValidationResult::Exclude;
        }
        if self.is_cloud_artifact(path) {
            return ValidationResult::Exclude;
        }
        if self.is_hidden_path(path) {
            return ValidationResult::Exclude;
        }
        if self.is_sensitive_path(path) {
            return ValidationResult::MetadataOnly;
        }
        if let Some(size) = size {
            if size > self.max_file_size {
                return ValidationResult::Exclude;
            }
        }
        ValidationResult::Include
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_node_modules() {
        let rules = PathRules::default();
        assert_eq!(rules.validate("/home/u/proj/node_modules/foo/index.js", None), ValidationResult::Exclude);
    }

    #[test]
    fn excludes_git_internals() {
        let rules = PathRules::default();
        assert_eq!(rules.validate("/home/u/proj/.git/objects/ab/cd", None), ValidationResult::Exclude);
    }

    #[test]
    fn sensitive_dir_is_metadata_only() {
        let rules = PathRules::default();
        assert_eq!(rules.validate("/home/u/.ssh/id_rsa", None), ValidationResult::MetadataOnly);
    }

    #[test]
    fn dev_toolchain_dotdirs_are_included() {
        let rules = PathRules::default();
        assert_eq!(rules.validate("/home/u/.cargo/registry/src/lib.rs", None), ValidationResult::Include);
    }

    #[test]
    fn other_hidden_dirs_are_excluded() {
        let rules = PathRules::default();
        assert_eq!(rules.validate("/home/u/.secret_stuff/notes.txt", None), ValidationResult::Exclude);
    }

    #[test]
    fn oversized_file_is_excluded() {
        let rules = PathRules::new(100);
        assert_eq!(rules.validate("/home/u/big.bin", Some(200)), ValidationResult::Exclude);
    }

    #[test]
    fn plain_file_is_included() {
        let rules = PathRules::default();
        assert_eq!(rules.validate("/home/u/notes.txt", Some(10)), ValidationResult::Include);
    }

    #[test]
    fn double_star_matches_any_depth() {
        assert!(match_glob("**/target/**", "/a/b/target/debug/out"));
        assert!(!match_glob("**/target/**", "/a/b/targets/debug/out"));
    }

    #[test]
    fn cloud_folder_detection() {
        let rules = PathRules::default();
        assert!(rules.is_cloud_folder("/Users/u/Dropbox/file.txt"));
        assert!(rules.is_cloud_artifact("/Users/u/Dropbox/.dropbox.cache/x"));
    }

    #[test]
    fn user_ignore_pattern_excludes() {
        let mut rules = PathRules::default();
        let dir = tempfile::tempdir().unwrap();
        let ignore_path = dir.path().join(".bsignore");
        std::fs::write(&ignore_path, "*.secret\n# comment\n\nprivate/**\n").unwrap();
        rules.load_bsignore(&ignore_path).unwrap();
        assert_eq!(rules.validate("/home/u/notes.secret", None), ValidationResult::Exclude);
        assert_eq!(rules.validate("/home/u/private/a.txt", None), ValidationResult::Exclude);
        assert_eq!(rules.validate("/home/u/public/a.txt", None), ValidationResult::Include);
    }
}
