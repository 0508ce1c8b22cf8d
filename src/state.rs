use log::{debug, info};

use crate::data::filter::{FilterState, FilterUpdate, filtered_indices};
use crate::data::model::{BiasRecord, MarkRecord, RecordStore, ScoreRecord};
use crate::engine::DashboardView;

// ---------------------------------------------------------------------------
// Session flags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

/// Per-session presentation flags, owned by [`AppState`] and handed to the
/// presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionFlags {
    pub theme: Theme,
    /// Set until the first record store is installed.
    pub loading: bool,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            loading: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Indices into each collection of the records passing the current filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredIndices {
    pub marks: Vec<usize>,
    pub scores: Vec<usize>,
    pub bias: Vec<usize>,
}

/// The full dashboard state, independent of rendering.
pub struct AppState {
    /// Loaded records (None until loading completes).
    pub store: Option<RecordStore>,

    /// Current selection. Change it through [`AppState::update_filters`].
    filters: FilterState,

    /// Records passing the current filters (cached).
    visible: FilteredIndices,

    /// View model for the current filters (cached).
    view: Option<DashboardView>,

    pub flags: SessionFlags,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(FilterState::default())
    }
}

impl AppState {
    pub fn new(filters: FilterState) -> Self {
        Self {
            store: None,
            filters,
            visible: FilteredIndices::default(),
            view: None,
            flags: SessionFlags::default(),
        }
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn visible(&self) -> &FilteredIndices {
        &self.visible
    }

    /// Current view model; `None` while loading.
    pub fn view(&self) -> Option<&DashboardView> {
        self.view.as_ref()
    }

    /// Mark the session as loading, e.g. before a reload.
    pub fn begin_loading(&mut self) {
        self.flags.loading = true;
    }

    /// Install the loaded records and compute the first view.
    pub fn set_store(&mut self, store: RecordStore) {
        info!(
            "record store ready: {} marks, {} scores, {} bias records",
            store.marks.len(),
            store.scores.len(),
            store.bias.len()
        );
        self.store = Some(store);
        self.flags.loading = false;
        self.refilter();
    }

    /// Merge a partial filter change and recompute.
    pub fn update_filters(&mut self, update: FilterUpdate) {
        let next = self.filters.apply(update);
        if next == self.filters && self.view.is_some() {
            return;
        }
        debug!("filters changed: {next:?}");
        self.filters = next;
        self.refilter();
    }

    /// Recompute cached indices and the view after a filter or data change.
    pub fn refilter(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        self.visible = FilteredIndices {
            marks: filtered_indices(&store.marks, &self.filters),
            scores: filtered_indices(&store.scores, &self.filters),
            bias: filtered_indices(&store.bias, &self.filters),
        };

        let marks: Vec<&MarkRecord> = self.visible.marks.iter().map(|&i| &store.marks[i]).collect();
        let scores: Vec<&ScoreRecord> =
            self.visible.scores.iter().map(|&i| &store.scores[i]).collect();
        let bias: Vec<&BiasRecord> = self.visible.bias.iter().map(|&i| &store.bias[i]).collect();
        self.view = Some(DashboardView::from_filtered(
            store,
            &self.filters,
            &marks,
            &scores,
            &bias,
        ));
    }

    pub fn toggle_theme(&mut self) {
        self.flags.theme = self.flags.theme.toggled();
    }
}
