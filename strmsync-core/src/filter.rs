use crate::config::Pattern;
use crate::error::{Result, SyncError};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Exclusion filter compiled from glob patterns, matched against paths
/// relative to the source root.
#[derive(Debug, Clone)]
pub struct PathFilter {
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(exclude: &[Pattern]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pat in exclude {
            let glob = Glob::new(&pat.0)
                .map_err(|e| SyncError::ConfigInvalid(format!("exclude pattern {:?}: {e}", pat.0)))?;
            builder.add(glob);
        }
        let exclude = builder
            .build()
            .map_err(|e| SyncError::ConfigInvalid(format!("exclude patterns: {e}")))?;
        Ok(Self { exclude })
    }

    pub fn is_excluded(&self, rel_path: &str) -> bool {
        !self.exclude.is_empty() && self.exclude.is_match(rel_path)
    }
}
