use notify::{
    event::{ModifyKind, RenameMode},
    EventKind,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// One observed filesystem occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// Prior path, set for `Moved` only
    pub from: Option<PathBuf>,
}

impl ChangeEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::simple(path, ChangeKind::Created)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::simple(path, ChangeKind::Modified)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::simple(path, ChangeKind::Deleted)
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            path: to.into(),
            kind: ChangeKind::Moved,
            from: Some(from.into()),
        }
    }

    fn simple(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            from: None,
        }
    }
}

/// Convert a notify::Event into zero or more ChangeEvents. Events on `root`
/// itself are dropped.
pub fn from_notify(event: notify::Event, root: &Path) -> Vec<ChangeEvent> {
    let mut out = Vec::new();
    match event.kind {
        EventKind::Create(_) => {
            out.extend(event.paths.into_iter().map(ChangeEvent::created));
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both if event.paths.len() == 2 => {
                let mut paths = event.paths.into_iter();
                if let (Some(from), Some(to)) = (paths.next(), paths.next()) {
                    out.push(ChangeEvent::moved(from, to));
                }
            }
            RenameMode::From => {
                out.extend(event.paths.into_iter().map(ChangeEvent::deleted));
            }
            RenameMode::To => {
                out.extend(event.paths.into_iter().map(ChangeEvent::created));
            }
            // Half of a rename with no pairing info: decide by what is on disk now.
            _ => {
                for p in event.paths {
                    if p.exists() {
                        out.push(ChangeEvent::created(p));
                    } else {
                        out.push(ChangeEvent::deleted(p));
                    }
                }
            }
        },
        EventKind::Modify(_) => {
            out.extend(event.paths.into_iter().map(ChangeEvent::modified));
        }
        EventKind::Remove(_) => {
            out.extend(event.paths.into_iter().map(ChangeEvent::deleted));
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }
    let inside = |p: &Path| p != root && p.starts_with(root);
    out.into_iter()
        .filter_map(|e| match e.from {
            // Moves across the root boundary degrade to a single create or delete.
            Some(from) => match (inside(&from), inside(&e.path)) {
                (true, true) => Some(ChangeEvent::moved(from, e.path)),
                (true, false) => Some(ChangeEvent::deleted(from)),
                (false, true) => Some(ChangeEvent::created(e.path)),
                (false, false) => None,
            },
            None => inside(&e.path).then_some(e),
        })
        .collect()
}
