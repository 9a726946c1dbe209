//! Filter Engine: a pure partition of a repository's file manifest into
//! included/excluded entries per [`FilterCriteria`].

use glob::{MatchOptions, Pattern};

use crate::types::{EntryKind, FileEntry, FilterCriteria};

/// Glob matching that lets `*` cross `/`, matching this project's documented
/// (if unusual) wildcard semantics rather than shell-style path boundaries.
const GLOB_MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

fn glob_matches(pattern: &str, path: &str) -> bool {
    Pattern::new(pattern).is_ok_and(|p| p.matches_with(path, GLOB_MATCH_OPTIONS))
}

fn extension_of(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!(".{}", ext.to_lowercase()),
        _ => String::new(),
    }
}

fn has_hidden_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with('.'))
}

impl FilterCriteria {
    /// Decides whether a single path matches this criteria, independent of
    /// any particular [`FileEntry`]'s kind or size.
    #[must_use]
    pub fn matches_path(&self, path: &str) -> bool {
        if !self.target_paths.is_empty()
            && !self.target_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
        {
            return false;
        }

        if !self.include_globs.is_empty()
            && !self.include_globs.iter().any(|g| glob_matches(g, path))
        {
            return false;
        }

        if self.exclude_globs.iter().any(|g| glob_matches(g, path)) {
            return false;
        }

        if !self.include_hidden && has_hidden_segment(path) {
            return false;
        }

        let ext = extension_of(path);

        if !self.included_exts.is_empty() && !self.included_exts.contains(&ext) {
            return false;
        }

        if self.excluded_exts.contains(&ext) {
            return false;
        }

        true
    }

    fn matches_size(&self, size: u64) -> bool {
        if let Some(min) = self.min_size {
            if size < min {
                return false;
            }
        }
        if let Some(max) = self.max_size {
            if size > max {
                return false;
            }
        }
        true
    }

    /// Full per-entry decision: kind, path, and size constraints combined.
    #[must_use]
    pub fn matches_entry(&self, entry: &FileEntry) -> bool {
        entry.kind == EntryKind::Blob && self.matches_path(&entry.path) && self.matches_size(entry.size)
    }
}

/// The result of partitioning a manifest by [`FilterCriteria`].
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    pub included: Vec<FileEntry>,
    pub excluded: Vec<FileEntry>,
    pub total_files: usize,
}

impl FilterResult {
    #[must_use]
    pub fn filtered_files(&self) -> usize {
        self.included.len()
    }
}

/// Partitions `files` into included/excluded according to `criteria`.
///
/// Pure and order-preserving; performs no I/O.
#[must_use]
pub fn filter_files(files: &[FileEntry], criteria: &FilterCriteria) -> FilterResult {
    let mut result = FilterResult {
        total_files: files.len(),
        ..Default::default()
    };
    for file in files {
        if criteria.matches_entry(file) {
            result.included.push(file.clone());
        } else {
            result.excluded.push(file.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(path: &str, size: u64) -> FileEntry {
        FileEntry::new_blob(path, size)
    }

    #[test]
    fn include_pattern_matches() {
        let criteria = FilterCriteria {
            include_globs: vec!["*.py".into()],
            ..Default::default()
        };
        assert!(criteria.matches_path("main.py"));
        assert!(!criteria.matches_path("README.md"));
    }

    #[test]
    fn exclude_pattern_blocks_path() {
        let criteria = FilterCriteria {
            exclude_globs: vec!["*.md".into()],
            ..Default::default()
        };
        assert!(criteria.matches_path("script.py"));
        assert!(!criteria.matches_path("docs/README.md"));
    }

    #[test]
    fn hidden_files_respect_include_hidden_flag() {
        let hidden_path = ".github/workflows/ci.yml";
        let visible_only = FilterCriteria::default();
        assert!(!visible_only.matches_path(hidden_path));

        let allow_hidden = FilterCriteria {
            include_hidden: true,
            ..Default::default()
        };
        assert!(allow_hidden.matches_path(hidden_path));
    }

    #[test]
    fn extension_filters_are_case_folded() {
        let criteria = FilterCriteria {
            included_exts: vec![".py".into()],
            excluded_exts: vec![".log".into()],
            ..Default::default()
        };
        assert!(criteria.matches_path("src/app.py"));
        assert!(!criteria.matches_path("src/app.txt"));
        assert!(!criteria.matches_path("logs/error.log"));
    }

    #[test]
    fn target_paths_are_enforced() {
        let criteria = FilterCriteria {
            target_paths: vec!["docs/".into()],
            include_globs: vec!["*.md".into()],
            ..Default::default()
        };
        assert!(criteria.matches_path("docs/guide.md"));
        assert!(!criteria.matches_path("src/guide.md"));
    }

    #[test]
    fn target_paths_enforced_on_entries_independent_of_include_globs() {
        let criteria = FilterCriteria {
            target_paths: vec!["docs/".into()],
            ..Default::default()
        };
        assert!(criteria.matches_entry(&blob("docs/guide.txt", 10)));
        assert!(!criteria.matches_entry(&blob("src/guide.txt", 10)));
    }

    #[test]
    fn combined_filters_scenario() {
        let criteria = FilterCriteria {
            include_globs: vec!["src/*.py".into()],
            exclude_globs: vec!["*/test_*.py".into()],
            min_size: Some(50),
            max_size: Some(500),
            included_exts: vec![".py".into()],
            ..Default::default()
        };

        let files = vec![
            blob("src/main.py", 200),
            blob("src/test_helper.py", 200),
            blob("src/small.py", 10),
            blob("src/large.py", 600),
            blob("src/docs/readme.md", 100),
            FileEntry {
                kind: EntryKind::Tree,
                ..blob("src/utils/helper.py", 300)
            },
        ];

        let result = filter_files(&files, &criteria);

        assert_eq!(
            result.included.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(),
            vec!["src/main.py"]
        );
        assert_eq!(result.total_files, 6);
        assert_eq!(result.filtered_files(), 1);
    }

    #[test]
    fn partition_covers_every_input_exactly_once() {
        let criteria = FilterCriteria {
            included_exts: vec![".rs".into()],
            ..Default::default()
        };
        let files = vec![blob("a.rs", 1), blob("b.py", 1), blob("c.rs", 1)];
        let result = filter_files(&files, &criteria);
        assert_eq!(result.included.len() + result.excluded.len(), files.len());
    }
}
