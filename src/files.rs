//! Image list with filtering, navigation and multi-selection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{ImageEntry, ImageListing, LabelSource};

/// Label-state filter for the file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFilter {
    #[default]
    All,
    Labeled,
    Unlabeled,
}

impl FileFilter {
    pub fn accepts(&self, entry: &ImageEntry) -> bool {
        match self {
            FileFilter::All => true,
            FileFilter::Labeled => entry.labeled,
            FileFilter::Unlabeled => !entry.labeled,
        }
    }
}

/// Counts for the selected folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FolderStats {
    pub total: usize,
    pub labeled: usize,
    pub unlabeled: usize,
}

/// The images known to the editor.
#[derive(Debug, Clone, Default)]
pub struct FileList {
    entries: Vec<ImageEntry>,
    folders: Vec<String>,
    filter: FileFilter,
    folder: Option<String>,
    selected: BTreeSet<String>,
}

impl FileList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_listing(listing: ImageListing) -> Self {
        let mut list = Self::new();
        list.replace(listing);
        list
    }

    /// Replace the entries with a fresh listing. Filters are kept; selected
    /// names that no longer exist are dropped.
    pub fn replace(&mut self, listing: ImageListing) {
        self.entries = listing.images;
        self.folders = listing.folders;
        let names: BTreeSet<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
        self.selected.retain(|name| names.contains(name.as_str()));
        if let Some(folder) = &self.folder {
            if !self.folders.contains(folder) {
                log::debug!("Folder {} no longer exists, clearing folder filter", folder);
                self.folder = None;
            }
        }
    }

    pub fn entries(&self) -> &[ImageEntry] {
        &self.entries
    }

    pub fn folders(&self) -> &[String] {
        &self.folders
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    // =========================================================================
    // Filtering
    // =========================================================================

    pub fn filter(&self) -> FileFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: FileFilter) {
        self.filter = filter;
    }

    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }

    /// Restrict the list to one folder. An empty name clears the filter.
    pub fn set_folder(&mut self, folder: Option<String>) {
        self.folder = folder.filter(|f| !f.is_empty());
    }

    fn in_folder(&self, entry: &ImageEntry) -> bool {
        match &self.folder {
            Some(folder) => entry
                .name
                .strip_prefix(folder.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
            None => true,
        }
    }

    /// Entries passing both the folder and the label filter, in listing order.
    pub fn filtered(&self) -> Vec<&ImageEntry> {
        self.entries
            .iter()
            .filter(|e| self.in_folder(e) && self.filter.accepts(e))
            .collect()
    }

    /// Position of `name` in the filtered list.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.filtered().iter().position(|e| e.name == name)
    }

    /// Counts for the current folder, ignoring the label filter.
    pub fn stats(&self) -> FolderStats {
        let (total, labeled) = self
            .entries
            .iter()
            .filter(|e| self.in_folder(e))
            .fold((0, 0), |(total, labeled), e| {
                (total + 1, labeled + usize::from(e.labeled))
            });
        FolderStats {
            total,
            labeled,
            unlabeled: total - labeled,
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Image `delta` steps away from `current` in the filtered list.
    ///
    /// Clamps at both ends and returns `None` when there is nowhere to go.
    /// If `current` is not in the filtered list the first entry is returned.
    pub fn neighbor(&self, current: Option<&str>, delta: isize) -> Option<&str> {
        let filtered = self.filtered();
        let first = filtered.first()?;
        let Some(index) = current.and_then(|name| filtered.iter().position(|e| e.name == name))
        else {
            return Some(first.name.as_str());
        };
        let target = index
            .saturating_add_signed(delta)
            .min(filtered.len() - 1);
        (target != index).then(|| filtered[target].name.as_str())
    }

    /// Entry to show after `removed_index` was deleted from the filtered list.
    pub fn after_removal(&self, removed_index: usize) -> Option<&str> {
        let filtered = self.filtered();
        let last = filtered.len().checked_sub(1)?;
        Some(filtered[removed_index.min(last)].name.as_str())
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Remove an image. Returns its former position in the filtered list.
    pub fn remove(&mut self, name: &str) -> Option<usize> {
        let filtered_index = self.index_of(name);
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        self.selected.remove(name);
        if self.entries.len() == before {
            log::warn!("Tried to remove unknown image {}", name);
        }
        filtered_index
    }

    /// Record whether an image now has labels.
    pub fn set_labeled(&mut self, name: &str, labeled: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.labeled = labeled;
            entry.label_source = if labeled {
                LabelSource::Manual
            } else {
                LabelSource::None
            };
        }
    }

    // =========================================================================
    // Multi-selection
    // =========================================================================

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    /// Selected names in listing order.
    pub fn selected(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| self.selected.contains(&e.name))
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    pub fn toggle_selected(&mut self, name: &str) {
        if !self.selected.remove(name) && self.get(name).is_some() {
            self.selected.insert(name.to_string());
        }
    }

    /// Select every filtered entry, or deselect them if all are selected.
    pub fn toggle_select_all(&mut self) {
        let names: Vec<String> = self.filtered().iter().map(|e| e.name.clone()).collect();
        if names.iter().all(|n| self.selected.contains(n)) {
            for name in &names {
                self.selected.remove(name);
            }
        } else {
            self.selected.extend(names);
        }
    }

    /// Replace the selection with labeled filtered entries from one source.
    /// Returns how many were selected.
    pub fn select_by_source(&mut self, source: LabelSource) -> usize {
        let names: Vec<String> = self
            .filtered()
            .iter()
            .filter(|e| e.labeled && e.label_source == source)
            .map(|e| e.name.clone())
            .collect();
        self.selected = names.into_iter().collect();
        log::debug!("Selected {} {} images", self.selected.len(), source.name());
        self.selected.len()
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }
}
