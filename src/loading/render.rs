//! What a loading wrapper hands to the UI layer

use serde::Serialize;

use crate::loading::fallback::{ErrorView, Placeholder};

/// View produced by a loading wrapper. `T` is the host's renderable unit and
/// is passed through untouched.
#[derive(Debug, Clone)]
pub enum Rendered<T> {
    /// Nothing is shown yet (grace period)
    Nothing,
    Placeholder(Placeholder),
    Content(T),
    Error(ErrorView),
}

impl<T> Rendered<T> {
    pub fn kind(&self) -> RenderKind {
        match self {
            Rendered::Nothing => RenderKind::Nothing,
            Rendered::Placeholder(_) => RenderKind::Fallback,
            Rendered::Content(_) => RenderKind::Content,
            Rendered::Error(_) => RenderKind::Error,
        }
    }

    pub fn content(&self) -> Option<&T> {
        match self {
            Rendered::Content(content) => Some(content),
            _ => None,
        }
    }

    pub fn error_view(&self) -> Option<&ErrorView> {
        match self {
            Rendered::Error(view) => Some(view),
            _ => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Rendered::Placeholder(_))
    }
}

/// Shape of a rendered view, used for render traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    Nothing,
    Fallback,
    Content,
    Error,
}
