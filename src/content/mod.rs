//! Published content nodes and their generation-indexed stores.

pub mod generation;
pub mod property;
pub mod published;
pub mod store;

use std::sync::Arc;

use nucache_records::ItemKind;

pub use generation::{ChangeSet, Generation};
pub use property::{Property, ValueScope};
pub use published::{ContentNode, PublishedContent};
pub use store::ContentStore;

/// One store per item kind.
#[derive(Clone)]
pub struct ContentStores {
    pub content: Arc<ContentStore>,
    pub media: Arc<ContentStore>,
    pub members: Arc<ContentStore>,
}

impl ContentStores {
    pub fn new() -> Self {
        Self {
            content: Arc::new(ContentStore::new(ItemKind::Content)),
            media: Arc::new(ContentStore::new(ItemKind::Media)),
            members: Arc::new(ContentStore::new(ItemKind::Member)),
        }
    }

    pub fn get(&self, kind: ItemKind) -> &Arc<ContentStore> {
        match kind {
            ItemKind::Content => &self.content,
            ItemKind::Media => &self.media,
            ItemKind::Member => &self.members,
        }
    }
}

impl Default for ContentStores {
    fn default() -> Self {
        Self::new()
    }
}
