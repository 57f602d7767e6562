//! Closed classification of source paths by extension.

use crate::filter::PathFilter;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// Uploaded and represented locally by a pointer file.
    Media,
    /// Already a pointer file; mirrored locally, never uploaded.
    PointerSkip,
    /// No action at all.
    Ignored,
    /// Uploaded and mirrored into the target root.
    Plain,
}

/// Precedence: Ignored > Media > PointerSkip > Plain.
#[derive(Debug, Clone)]
pub struct Classifier {
    media: HashSet<String>,
    ignore: HashSet<String>,
    pointer_ext: String,
    filter: PathFilter,
}

/// Normalise a configured file type (`*.mp4`, `.MP4`, `mp4`) to `mp4`.
pub fn normalize_extension(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('*')
        .trim_start_matches('.')
        .to_ascii_lowercase()
}

impl Classifier {
    pub fn new(media: &[String], ignore: &[String], pointer_ext: &str, filter: PathFilter) -> Self {
        let collect = |list: &[String]| {
            list.iter()
                .map(|s| normalize_extension(s))
                .filter(|s| !s.is_empty())
                .collect::<HashSet<_>>()
        };
        Self {
            media: collect(media),
            ignore: collect(ignore),
            pointer_ext: normalize_extension(pointer_ext),
            filter,
        }
    }

    /// Classify a path. `rel_path` is the source-relative posix form used by
    /// the exclude globs.
    pub fn classify(&self, path: &Path, rel_path: &str) -> FileClass {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if self.filter.is_excluded(rel_path) {
            return FileClass::Ignored;
        }
        if ext.is_empty() {
            return FileClass::Plain;
        }
        if self.ignore.contains(&ext) {
            FileClass::Ignored
        } else if self.media.contains(&ext) {
            FileClass::Media
        } else if ext == self.pointer_ext {
            FileClass::PointerSkip
        } else {
            FileClass::Plain
        }
    }

    /// Exclusion alone, for directories, which have no file class.
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        self.filter.is_excluded(rel_path)
    }

    pub fn pointer_extension(&self) -> &str {
        &self.pointer_ext
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pattern;

    fn classifier(media: &[&str], ignore: &[&str]) -> Classifier {
        let media: Vec<String> = media.iter().map(|s| s.to_string()).collect();
        let ignore: Vec<String> = ignore.iter().map(|s| s.to_string()).collect();
        Classifier::new(&media, &ignore, "strm", PathFilter::new(&[]).unwrap())
    }

    fn class_of(c: &Classifier, p: &str) -> FileClass {
        c.classify(Path::new(p), p)
    }

    #[test]
    fn media_match_is_case_insensitive() {
        let c = classifier(&["*.mp4", ".MKV"], &[]);
        assert_eq!(class_of(&c, "a/Movie.MP4"), FileClass::Media);
        assert_eq!(class_of(&c, "b.mkv"), FileClass::Media);
        assert_eq!(class_of(&c, "b.nfo"), FileClass::Plain);
    }

    #[test]
    fn ignore_wins_over_media() {
        let c = classifier(&["*.mkv"], &[".mkv"]);
        assert_eq!(class_of(&c, "x.mkv"), FileClass::Ignored);
    }

    #[test]
    fn ignore_uses_exact_extension() {
        let c = classifier(&["*.mp4", "*.strm"], &[".mp"]);
        assert_eq!(class_of(&c, "movie.strm"), FileClass::Media);
        assert_eq!(class_of(&c, "movie.mp4"), FileClass::Media);
        assert_eq!(class_of(&c, "movie.mp"), FileClass::Ignored);
    }

    #[test]
    fn empty_extension_is_plain() {
        let c = classifier(&["*.mp4"], &[""]);
        assert_eq!(class_of(&c, "README"), FileClass::Plain);
        assert_eq!(class_of(&c, "dir/.hidden"), FileClass::Plain);
    }

    #[test]
    fn pointer_files_outside_media_set_are_skipped() {
        let c = classifier(&["*.mp4"], &[]);
        assert_eq!(class_of(&c, "old.strm"), FileClass::PointerSkip);
    }

    #[test]
    fn exclude_globs_are_ignored() {
        let filter = PathFilter::new(&[Pattern("**/@eaDir/**".into())]).unwrap();
        let c = Classifier::new(&["mkv".to_string()], &[], "strm", filter);
        assert_eq!(class_of(&c, "Movies/@eaDir/a.mkv"), FileClass::Ignored);
        assert_eq!(class_of(&c, "Movies/a.mkv"), FileClass::Media);
    }
}
