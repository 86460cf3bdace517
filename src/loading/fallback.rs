//! Fallback catalog: named placeholder views shown while content is unavailable

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::loading::error::LoadError;
use crate::loading::retry::RetryAction;

/// Keys of the fixed fallback catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackKind {
    #[default]
    Default,
    Card,
    List,
    Profile,
    Error,
}

impl FallbackKind {
    pub const ALL: [FallbackKind; 5] = [
        FallbackKind::Default,
        FallbackKind::Card,
        FallbackKind::List,
        FallbackKind::Profile,
        FallbackKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackKind::Default => "default",
            FallbackKind::Card => "card",
            FallbackKind::List => "list",
            FallbackKind::Profile => "profile",
            FallbackKind::Error => "error",
        }
    }

    /// Resolve a configuration key. Unknown keys degrade to `Default`.
    pub fn from_key(key: &str) -> Self {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(key))
            .unwrap_or_else(|| {
                debug!(key, "Unknown fallback key, using default placeholder");
                FallbackKind::Default
            })
    }
}

impl From<&str> for FallbackKind {
    fn from(key: &str) -> Self {
        Self::from_key(key)
    }
}

impl fmt::Display for FallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static placeholder data for a loading view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub kind: FallbackKind,
    pub message: &'static str,
    /// Number of skeleton rows the host draws under the message
    pub skeleton_rows: u8,
    pub show_avatar: bool,
}

const DEFAULT_PLACEHOLDER: Placeholder = Placeholder {
    kind: FallbackKind::Default,
    message: "Loading...",
    skeleton_rows: 0,
    show_avatar: false,
};

const CARD_PLACEHOLDER: Placeholder = Placeholder {
    kind: FallbackKind::Card,
    message: "Loading content...",
    skeleton_rows: 3,
    show_avatar: false,
};

const LIST_PLACEHOLDER: Placeholder = Placeholder {
    kind: FallbackKind::List,
    message: "Loading list...",
    skeleton_rows: 5,
    show_avatar: true,
};

const PROFILE_PLACEHOLDER: Placeholder = Placeholder {
    kind: FallbackKind::Profile,
    message: "Loading profile...",
    skeleton_rows: 2,
    show_avatar: true,
};

/// Error view built from a failure and a retry action
#[derive(Debug, Clone)]
pub struct ErrorView {
    pub title: String,
    pub message: String,
    retry: RetryAction,
}

impl ErrorView {
    pub fn new(title: impl Into<String>, message: impl Into<String>, retry: RetryAction) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            retry,
        }
    }

    pub fn retry_label(&self) -> &'static str {
        self.retry.label()
    }

    /// Activate the retry control
    pub fn retry(&self) {
        self.retry.invoke();
    }
}

/// Constructor for error views
pub type ErrorTemplate = Arc<dyn Fn(&LoadError, RetryAction) -> ErrorView + Send + Sync>;

fn default_error_template(error: &LoadError, retry: RetryAction) -> ErrorView {
    ErrorView::new("Something went wrong", error.display_message(), retry)
}

/// One catalog entry: static data, or the error view constructor
#[derive(Clone)]
pub enum CatalogEntry {
    Static(Placeholder),
    Error(ErrorTemplate),
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogEntry::Static(placeholder) => f.debug_tuple("Static").field(placeholder).finish(),
            CatalogEntry::Error(_) => f.write_str("Error(<template>)"),
        }
    }
}

/// Catalog of fallback views
#[derive(Clone)]
pub struct FallbackCatalog {
    error_template: ErrorTemplate,
}

impl FallbackCatalog {
    pub fn new() -> Self {
        Self {
            error_template: Arc::new(default_error_template),
        }
    }

    /// Replace the error view constructor
    pub fn with_error_template<F>(template: F) -> Self
    where
        F: Fn(&LoadError, RetryAction) -> ErrorView + Send + Sync + 'static,
    {
        Self {
            error_template: Arc::new(template),
        }
    }

    /// Look up an entry by key; unknown keys yield the default placeholder
    pub fn entry(&self, key: &str) -> CatalogEntry {
        match FallbackKind::from_key(key) {
            FallbackKind::Error => CatalogEntry::Error(Arc::clone(&self.error_template)),
            kind => CatalogEntry::Static(self.placeholder(kind)),
        }
    }

    /// Static placeholder for a kind. `Error` needs a failure to render, so
    /// a pending view configured with it shows the default placeholder.
    pub fn placeholder(&self, kind: FallbackKind) -> Placeholder {
        match kind {
            FallbackKind::Default | FallbackKind::Error => DEFAULT_PLACEHOLDER,
            FallbackKind::Card => CARD_PLACEHOLDER,
            FallbackKind::List => LIST_PLACEHOLDER,
            FallbackKind::Profile => PROFILE_PLACEHOLDER,
        }
    }

    pub fn error_view(&self, error: &LoadError, retry: RetryAction) -> ErrorView {
        (self.error_template)(error, retry)
    }
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FallbackCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackCatalog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::error::GENERIC_LOAD_FAILURE;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_known_keys_resolve() {
        assert_eq!(FallbackKind::from_key("card"), FallbackKind::Card);
        assert_eq!(FallbackKind::from_key("LIST"), FallbackKind::List);
        assert_eq!(FallbackKind::from_key(" profile "), FallbackKind::Profile);
        assert_eq!(FallbackKind::from_key("error"), FallbackKind::Error);
    }

    #[test]
    fn test_unknown_key_degrades_to_default() {
        let catalog = FallbackCatalog::new();

        assert_eq!(FallbackKind::from_key("spinner"), FallbackKind::Default);
        assert_eq!(FallbackKind::from_key(""), FallbackKind::Default);
        match catalog.entry("definitely-not-a-key") {
            CatalogEntry::Static(placeholder) => assert_eq!(placeholder, DEFAULT_PLACEHOLDER),
            other => panic!("Expected default placeholder, got {:?}", other),
        }
    }

    #[test]
    fn test_static_entries() {
        let catalog = FallbackCatalog::new();
        for key in ["default", "card", "list", "profile"] {
            match catalog.entry(key) {
                CatalogEntry::Static(placeholder) => assert_eq!(placeholder.kind.as_str(), key),
                other => panic!("Expected static entry for {}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_error_entry_builds_view_with_retry() {
        let catalog = FallbackCatalog::new();
        let retries = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&retries);
        let retry = RetryAction::new("Try again", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let template = match catalog.entry("error") {
            CatalogEntry::Error(template) => template,
            other => panic!("Expected error entry, got {:?}", other),
        };

        let view = template(&LoadError::module("chunk missing"), retry);
        assert_eq!(view.message, "chunk missing");
        assert_eq!(view.retry_label(), "Try again");

        view.retry();
        assert_eq!(retries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_view_generic_message() {
        let catalog = FallbackCatalog::new();
        let view = catalog.error_view(&LoadError::module(""), RetryAction::new("Retry", || {}));
        assert_eq!(view.message, GENERIC_LOAD_FAILURE);
    }

    #[test]
    fn test_error_kind_placeholder_is_default() {
        let catalog = FallbackCatalog::new();
        assert_eq!(catalog.placeholder(FallbackKind::Error), DEFAULT_PLACEHOLDER);
    }

    #[test]
    fn test_custom_error_template() {
        let catalog = FallbackCatalog::with_error_template(|error, retry| {
            ErrorView::new("Feed unavailable", format!("[{}]", error), retry)
        });
        let view = catalog.error_view(&LoadError::module("boom"), RetryAction::new("Retry", || {}));
        assert_eq!(view.title, "Feed unavailable");
        assert_eq!(view.message, "[boom]");
    }
}
