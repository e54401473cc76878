//! Folder navigation state for a file browser.

use crate::models::api::FileEntry;

/// What the browser is looking at: a bucket and a folder prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BrowserState {
    prefix: String,
    bucket: Option<String>,
}

/// One clickable segment of the current path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breadcrumb {
    pub label: String,
    pub prefix: String,
}

impl BrowserState {
    pub fn new(bucket: Option<String>) -> Self {
        Self {
            prefix: String::new(),
            bucket,
        }
    }

    pub fn at(bucket: Option<String>, prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            bucket,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Open a folder entry; its name is already the full prefix.
    pub fn enter(&mut self, folder: &FileEntry) {
        if folder.is_folder {
            self.prefix = folder.name.clone();
        }
    }

    pub fn up(&mut self) {
        self.prefix = parent_folder(&self.prefix);
    }

    pub fn is_root(&self) -> bool {
        self.prefix.is_empty()
    }

    /// `Root` followed by one crumb per folder level.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        let mut crumbs = vec![Breadcrumb {
            label: "Root".into(),
            prefix: String::new(),
        }];
        let mut path = String::new();
        for part in self.prefix.split('/').filter(|p| !p.is_empty()) {
            path.push_str(part);
            path.push('/');
            crumbs.push(Breadcrumb {
                label: part.to_string(),
                prefix: path.clone(),
            });
        }
        crumbs
    }

    /// Entry name relative to the current folder.
    pub fn display_name<'a>(&self, entry: &'a FileEntry) -> &'a str {
        entry
            .name
            .strip_prefix(self.prefix.as_str())
            .filter(|rest| !rest.is_empty())
            .unwrap_or(&entry.name)
    }
}

/// `a/b/c/` -> `a/b/`, `a/` -> ``.
pub fn parent_folder(path: &str) -> String {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => trimmed[..=idx].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigates_down_and_up() {
        let mut state = BrowserState::new(Some("photos".into()));
        state.enter(&FileEntry::folder("2025/", "photos"));
        state.enter(&FileEntry::folder("2025/summer/", "photos"));
        assert_eq!(state.prefix(), "2025/summer/");

        state.up();
        assert_eq!(state.prefix(), "2025/");
        state.up();
        assert!(state.is_root());
        state.up();
        assert!(state.is_root());
    }

    #[test]
    fn breadcrumbs_accumulate_prefixes() {
        let state = BrowserState::at(None, "a/b/c/");
        let prefixes: Vec<_> = state.breadcrumbs().into_iter().map(|c| c.prefix).collect();
        assert_eq!(prefixes, vec!["", "a/", "a/b/", "a/b/c/"]);
        assert_eq!(state.breadcrumbs()[2].label, "b");
    }

    #[test]
    fn parent_of_top_level_is_root() {
        assert_eq!(parent_folder("a/"), "");
        assert_eq!(parent_folder("a/b/"), "a/");
        assert_eq!(parent_folder(""), "");
    }

    #[test]
    fn display_name_is_relative() {
        let state = BrowserState::at(None, "docs/");
        let entry = FileEntry::folder("docs/old/", "b");
        assert_eq!(state.display_name(&entry), "old/");
    }
}
