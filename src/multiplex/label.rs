//! Labels identifying merged sources.

use std::{borrow::Borrow, sync::Arc};

/// Opaque name of one merged source.
///
/// Labels are cloned onto every yielded item, so they share one allocation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(Arc<str>);

impl Label {
    /// Create a label from any string.
    #[must_use]
    pub fn new(label: impl AsRef<str>) -> Self { Self(Arc::from(label.as_ref())) }

    /// The label text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self { Self(Arc::from(value)) }
}

impl From<String> for Label {
    fn from(value: String) -> Self { Self(Arc::from(value)) }
}

impl From<&String> for Label {
    fn from(value: &String) -> Self { Self::from(value.as_str()) }
}

impl Borrow<str> for Label {
    fn borrow(&self) -> &str { &self.0 }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str { &self.0 }
}

impl PartialEq<str> for Label {
    fn eq(&self, other: &str) -> bool { &*self.0 == other }
}

impl PartialEq<&str> for Label {
    fn eq(&self, other: &&str) -> bool { &*self.0 == *other }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}
