//! Conflict naming for occupied destinations
//!
//! When a target name is taken, candidates are generated by inserting a
//! counter:
//!
//! - files: `report.pdf` -> `report(1).pdf`, `report(2).pdf`, ...
//! - directories: `photos` -> `photos(1)`, `photos(2)`, ...
//!
//! The existence check is supplied by the caller so the search stays pure.

use fsmgr_core::domain::newtypes::validate_name;
use tracing::debug;

use crate::error::NamingError;

/// Default upper bound for the `(n)` counter
pub const DEFAULT_MAX_SUFFIX: u32 = 10_000;

/// Whether a name belongs to a file (suffix goes before the extension)
/// or a directory (suffix goes at the end)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    File,
    Directory,
}

/// Split `name` into stem and extension (without the dot).
///
/// A leading dot does not start an extension, so `.env` has none.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Make a file rename keep the source's extension.
///
/// If `requested` does not already end in the source extension (compared
/// case-insensitively), the source extension is appended. Sources without
/// an extension leave `requested` untouched.
///
/// ```
/// use fsmgr_conflict::force_extension;
///
/// assert_eq!(force_extension("report.pdf", "summary"), "summary.pdf");
/// assert_eq!(force_extension("report.pdf", "summary.PDF"), "summary.PDF");
/// assert_eq!(force_extension("report.pdf", "summary.txt"), "summary.txt.pdf");
/// ```
pub fn force_extension(source: &str, requested: &str) -> String {
    let Some(source_ext) = split_extension(source).1 else {
        return requested.to_string();
    };
    match split_extension(requested).1 {
        Some(ext) if ext.eq_ignore_ascii_case(source_ext) => requested.to_string(),
        _ => format!("{requested}.{source_ext}"),
    }
}

/// Produces free names for occupied destinations
#[derive(Debug, Clone, Copy)]
pub struct NameConflictResolver {
    max_suffix: u32,
}

impl Default for NameConflictResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUFFIX)
    }
}

impl NameConflictResolver {
    #[must_use]
    pub fn new(max_suffix: u32) -> Self {
        Self {
            max_suffix: max_suffix.max(1),
        }
    }

    pub fn max_suffix(&self) -> u32 {
        self.max_suffix
    }

    /// The `n`-th candidate for `name`
    pub fn candidate(name: &str, kind: NameKind, n: u32) -> String {
        match (kind, split_extension(name)) {
            (NameKind::File, (stem, Some(ext))) => format!("{stem}({n}).{ext}"),
            _ => format!("{name}({n})"),
        }
    }

    /// All suffixed candidates in search order, bounded by the cap
    pub fn candidates<'a>(&self, name: &'a str, kind: NameKind) -> impl Iterator<Item = String> + 'a {
        (1..=self.max_suffix).map(move |n| Self::candidate(name, kind, n))
    }

    /// Return `name` itself if free, otherwise the first free candidate.
    ///
    /// # Errors
    /// `InvalidName` if `name` is not a single segment, `TooManyConflicts`
    /// when every candidate up to the cap is taken.
    pub fn unique_name<F>(&self, name: &str, kind: NameKind, mut exists: F) -> Result<String, NamingError>
    where
        F: FnMut(&str) -> bool,
    {
        validate_name(name)?;
        if !exists(name) {
            return Ok(name.to_string());
        }

        for candidate in self.candidates(name, kind) {
            if !exists(&candidate) {
                debug!(original = name, chosen = %candidate, "Resolved name conflict");
                return Ok(candidate);
            }
        }

        Err(NamingError::TooManyConflicts {
            name: name.to_string(),
            max: self.max_suffix,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn taken(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_free_name_is_returned_unchanged() {
        let resolver = NameConflictResolver::default();
        let name = resolver
            .unique_name("report.pdf", NameKind::File, |_| false)
            .unwrap();
        assert_eq!(name, "report.pdf");
    }

    #[test]
    fn test_file_suffix_goes_before_extension() {
        let existing = taken(&["report.pdf"]);
        let name = NameConflictResolver::default()
            .unique_name("report.pdf", NameKind::File, |n| existing.contains(n))
            .unwrap();
        assert_eq!(name, "report(1).pdf");
    }

    #[test]
    fn test_directory_suffix_goes_at_end() {
        let existing = taken(&["v1.2"]);
        let name = NameConflictResolver::default()
            .unique_name("v1.2", NameKind::Directory, |n| existing.contains(n))
            .unwrap();
        assert_eq!(name, "v1.2(1)");
    }

    #[test]
    fn test_n_existing_names_yield_suffix_n() {
        let mut existing = taken(&["x.txt"]);
        for i in 1..5 {
            existing.insert(format!("x({i}).txt"));
        }
        let name = NameConflictResolver::default()
            .unique_name("x.txt", NameKind::File, |n| existing.contains(n))
            .unwrap();
        assert_eq!(name, "x(5).txt");
    }

    #[test]
    fn test_multiple_dots_use_last_extension() {
        assert_eq!(
            NameConflictResolver::candidate("archive.tar.gz", NameKind::File, 2),
            "archive.tar(2).gz"
        );
    }

    #[test]
    fn test_dotfile_has_no_extension() {
        assert_eq!(split_extension(".env"), (".env", None));
        assert_eq!(
            NameConflictResolver::candidate(".env", NameKind::File, 1),
            ".env(1)"
        );
    }

    #[test]
    fn test_cap_is_enforced() {
        let resolver = NameConflictResolver::new(3);
        let err = resolver
            .unique_name("a.txt", NameKind::File, |_| true)
            .unwrap_err();
        assert_eq!(
            err,
            NamingError::TooManyConflicts {
                name: "a.txt".to_string(),
                max: 3
            }
        );
    }

    #[test]
    fn test_invalid_base_name() {
        let err = NameConflictResolver::default()
            .unique_name("a/b", NameKind::File, |_| false)
            .unwrap_err();
        assert!(matches!(err, NamingError::InvalidName(_)));
    }

    #[test]
    fn test_candidates_are_bounded() {
        let resolver = NameConflictResolver::new(4);
        let all: Vec<_> = resolver.candidates("d", NameKind::Directory).collect();
        assert_eq!(all, vec!["d(1)", "d(2)", "d(3)", "d(4)"]);
    }

    // ------------------------------------------------------------------------
    // Extension forcing
    // ------------------------------------------------------------------------

    #[test]
    fn test_force_extension_cases() {
        assert_eq!(force_extension("report.pdf", "summary"), "summary.pdf");
        assert_eq!(force_extension("report.pdf", "summary.pdf"), "summary.pdf");
        assert_eq!(force_extension("report.pdf", "Summary.Pdf"), "Summary.Pdf");
        assert_eq!(force_extension("report.pdf", "summary.txt"), "summary.txt.pdf");
        assert_eq!(force_extension("Makefile", "GNUmakefile"), "GNUmakefile");
        assert_eq!(force_extension(".env", "env.local"), "env.local");
    }
}
