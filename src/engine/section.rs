use serde::Serialize;

/// A report section that is either populated or explicitly marked as
/// unavailable. Missing inputs never turn into default values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Available { value: T },
    Unavailable { reason: String },
}

impl<T> Section<T> {
    pub fn available(value: T) -> Self {
        Section::Available { value }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Section::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Section::Available { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Section::Available { value } => Some(value),
            Section::Unavailable { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Section::Available { value } => Some(value),
            Section::Unavailable { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Section::Available { .. } => None,
            Section::Unavailable { reason } => Some(reason),
        }
    }

    pub fn as_ref(&self) -> Section<&T> {
        match self {
            Section::Available { value } => Section::Available { value },
            Section::Unavailable { reason } => Section::Unavailable {
                reason: reason.clone(),
            },
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Section<U> {
        match self {
            Section::Available { value } => Section::Available { value: f(value) },
            Section::Unavailable { reason } => Section::Unavailable { reason },
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Section<U>) -> Section<U> {
        match self {
            Section::Available { value } => f(value),
            Section::Unavailable { reason } => Section::Unavailable { reason },
        }
    }

    /// Like `map`, but a failing `f` aborts instead of marking the section.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Section<U>, E> {
        match self {
            Section::Available { value } => Ok(Section::Available { value: f(value)? }),
            Section::Unavailable { reason } => Ok(Section::Unavailable { reason }),
        }
    }

    /// Combine two sections; the first unavailable reason wins.
    pub fn zip<U>(self, other: Section<U>) -> Section<(T, U)> {
        match (self, other) {
            (Section::Available { value: a }, Section::Available { value: b }) => {
                Section::Available { value: (a, b) }
            }
            (Section::Unavailable { reason }, _) | (_, Section::Unavailable { reason }) => {
                Section::Unavailable { reason }
            }
        }
    }
}
