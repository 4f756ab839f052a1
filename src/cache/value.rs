//! Memoization primitives shared by every cache level.
//!
//! A [`Memo`] is filled at most once; callers serialize access through the
//! lock that owns it (the property lock, or a scoped cache entry lock).

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::value::PropertyValue;
use crate::domain::variant::VariantKey;

/// A single memoized value.
#[derive(Debug)]
pub struct Memo<T> {
    slot: Option<Arc<T>>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<T> Memo<T> {
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.clone()
    }

    pub fn is_set(&self) -> bool {
        self.slot.is_some()
    }

    /// Return the memoized value, computing and storing it on first use.
    pub fn get_or_compute(&mut self, compute: impl FnOnce() -> T) -> Arc<T> {
        Arc::clone(self.slot.get_or_insert_with(|| Arc::new(compute())))
    }

    pub fn reset(&mut self) {
        self.slot = None;
    }
}

/// Which downstream conversion a memo holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Object,
    XPath,
}

/// Converted values for one variant.
#[derive(Debug, Default)]
pub struct VariantValues {
    object: Memo<PropertyValue>,
    xpath: Memo<PropertyValue>,
}

impl VariantValues {
    pub fn stage(&mut self, stage: Stage) -> &mut Memo<PropertyValue> {
        match stage {
            Stage::Object => &mut self.object,
            Stage::XPath => &mut self.xpath,
        }
    }
}

/// Converted values of one property, across all of its variants.
#[derive(Debug, Default)]
pub struct CacheValues {
    invariant: VariantValues,
    variants: HashMap<VariantKey, VariantValues>,
}

impl CacheValues {
    pub fn for_variant(&mut self, variant: &VariantKey) -> &mut VariantValues {
        if variant.is_invariant() {
            return &mut self.invariant;
        }
        self.variants.entry(variant.clone()).or_default()
    }
}
