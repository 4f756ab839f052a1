//! Variant keys: the `(culture, segment)` composite identifying one localized value.

use std::fmt;

/// Composite key for one variant of a property value.
///
/// An empty culture or segment means "invariant" on that axis. Cultures are
/// stored lowercased so `en-US` and `en-us` address the same value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    culture: String,
    segment: String,
}

impl VariantKey {
    pub fn new(culture: impl AsRef<str>, segment: impl Into<String>) -> Self {
        Self {
            culture: culture.as_ref().trim().to_ascii_lowercase(),
            segment: segment.into().trim().to_string(),
        }
    }

    pub fn invariant() -> Self {
        Self::default()
    }

    pub fn culture(culture: impl AsRef<str>) -> Self {
        Self::new(culture, String::new())
    }

    pub fn culture_code(&self) -> &str {
        &self.culture
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn is_invariant(&self) -> bool {
        self.culture.is_empty() && self.segment.is_empty()
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.culture, self.segment)
    }
}
