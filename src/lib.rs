//! Vocabulary highlighting for web pages.
//!
//! Words a reader selects are persisted through a [`StorageBackend`], found
//! again in page text by a [`WordMatcher`], and wrapped in markers by the
//! [`DomRewriter`]. The [`InteractionController`] keeps a page highlighted as
//! it changes and resolves definitions through a [`Dictionary`] when a marker
//! is hovered.

pub mod cache;
pub mod config;
pub mod controller;
pub mod dictionary;
pub mod error;
pub mod hover;
pub mod matcher;
pub mod page;
pub mod record;
pub mod rewriter;
pub mod storage;
pub mod store;
pub mod watcher;

pub use cache::{CacheEntry, TranslationCache};
pub use config::{CACHE_EXPIRY, EngineConfig, STORAGE_KEY};
pub use controller::{
    InteractionController, LookupOutcome, LookupPanel, PageEvent, PanelEvent, SelectionOutcome,
    Theme,
};
pub use dictionary::{
    Dictionary, StaticDictionary, format_parts_of_speech, lookup_url, parse_definition,
};
pub use error::{DomError, LookupError, StorageError};
pub use hover::{HoverEffect, HoverIntent};
pub use matcher::{MatchSpan, WordMatcher, find_matches};
pub use page::{MutationRecord, NodeId, Page, TextSource};
pub use record::{WordCollection, WordRecord, canonical_word};
pub use rewriter::{DomRewriter, MarkerHost, RewriteStats};
pub use storage::{JsonFileStorage, MemoryStorage, StorageBackend};
pub use store::WordStore;
pub use watcher::{BatchVerdict, MutationWatcher, WatcherState};
