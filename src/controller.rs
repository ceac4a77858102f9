//! Ties the engine together for one page.

use crate::cache::TranslationCache;
use crate::config::EngineConfig;
use crate::dictionary::{Dictionary, parse_definition};
use crate::error::{LookupError, StorageError};
use crate::hover::{HoverEffect, HoverIntent};
use crate::matcher::WordMatcher;
use crate::page::{MutationRecord, TextSource};
use crate::record::{WordRecord, canonical_word};
use crate::rewriter::{DomRewriter, ENGINE_ATTR, MarkerHost, PANEL_VALUE, RewriteStats};
use crate::store::WordStore;
use crate::storage::StorageBackend;
use crate::watcher::{BatchVerdict, MutationWatcher};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// Too short, malformed, or already tracked.
    Rejected,
    Added { record: WordRecord, markers: usize },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Definition { text: String, cached: bool },
    /// The dictionary had no entry; the word was dropped.
    NotFound,
    /// The dictionary could not be reached; the word was dropped.
    Failed(String),
    /// The word is not tracked (or was deleted).
    Untracked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPanel<N> {
    pub marker: N,
    pub word: String,
    pub definition: String,
    pub cached: bool,
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent<N> {
    Shown(LookupPanel<N>),
    Hidden { marker: N },
    /// The lookup failed and the word's markers were removed.
    Dismissed { marker: N, word: String },
}

/// Inputs delivered by the host page.
#[derive(Debug, Clone)]
pub enum PageEvent<N> {
    Mutations(Vec<MutationRecord<N>>),
    Selection(String),
    PointerEnter(N),
    PointerLeave(N),
    Delete(String),
    Shutdown,
}

#[derive(Debug)]
struct MarkerState<N> {
    word: String,
    display: String,
    hover: HoverIntent,
    panel: Option<N>,
}

/// Per-marker interactive state, kept apart from the page so the rewriter can
/// borrow both at once.
#[derive(Debug)]
struct Markers<N> {
    hover_delay: Duration,
    states: HashMap<N, MarkerState<N>>,
}

impl<N: Copy + Eq + Hash> MarkerHost<N> for Markers<N> {
    fn mount(&mut self, marker: N, word: &str, display: &str) {
        self.states.insert(
            marker,
            MarkerState {
                word: word.to_string(),
                display: display.to_string(),
                hover: HoverIntent::new(self.hover_delay),
                panel: None,
            },
        );
    }

    fn unmount(&mut self, marker: N) {
        self.states.remove(&marker);
    }
}

pub struct InteractionController<P: TextSource, B, D> {
    config: EngineConfig,
    page: P,
    store: WordStore<B>,
    cache: TranslationCache,
    dictionary: D,
    rewriter: DomRewriter,
    watcher: MutationWatcher<P::Node>,
    matcher: WordMatcher,
    markers: Markers<P::Node>,
    theme: Theme,
}

impl<P, B, D> InteractionController<P, B, D>
where
    P: TextSource,
    B: StorageBackend,
    D: Dictionary,
{
    pub fn new(config: EngineConfig, page: P, backend: B, dictionary: D) -> Self {
        Self {
            store: WordStore::with_key(backend, config.storage_key.clone()),
            cache: TranslationCache::new(config.cache_ttl, config.cache_capacity),
            rewriter: DomRewriter::new(config.marker_tag.clone()),
            watcher: MutationWatcher::new(config.debounce),
            markers: Markers {
                hover_delay: config.hover_delay,
                states: HashMap::new(),
            },
            matcher: WordMatcher::empty(),
            theme: Theme::default(),
            config,
            page,
            dictionary,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn into_page(self) -> P {
        self.page
    }

    pub fn store(&self) -> &WordStore<B> {
        &self.store
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn matcher(&self) -> &WordMatcher {
        &self.matcher
    }

    pub fn watcher(&self) -> &MutationWatcher<P::Node> {
        &self.watcher
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    /// Markers currently known to the hover layer.
    pub fn marker_count(&self) -> usize {
        self.markers.states.len()
    }

    /// Word and page text behind a marker.
    pub fn marker_word(&self, marker: P::Node) -> Option<(&str, &str)> {
        self.markers
            .states
            .get(&marker)
            .map(|state| (state.word.as_str(), state.display.as_str()))
    }

    /// Loads the active words, highlights the whole page and starts watching
    /// for new content.
    pub async fn start(&mut self) -> RewriteStats {
        self.observe_page(now());
        self.reload_words().await;
        let stats = self.scan_page().await;
        self.watcher.start();
        info!(
            words = self.matcher.len(),
            markers = stats.markers,
            scanned = stats.scanned,
            "highlighting started"
        );
        stats
    }

    pub fn stop(&mut self) {
        self.watcher.stop();
        let panels: Vec<P::Node> = self
            .markers
            .states
            .values_mut()
            .filter_map(|state| {
                state.hover.reset();
                state.panel.take()
            })
            .collect();
        for panel in panels {
            self.remove_panel(panel);
        }
        self.observe_page(now());
        debug!("highlighting stopped");
    }

    /// Handles a text selection: a new word is tracked and highlighted.
    pub async fn select(&mut self, text: &str) -> SelectionOutcome {
        if self.store.filter_word(text).await {
            return SelectionOutcome::Rejected;
        }
        let record = match self.store.add_queried_word(text).await {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "failed to add selected word");
                return SelectionOutcome::Failed(err.to_string());
            }
        };
        self.reload_words().await;
        let stats = self.scan_page().await;
        info!(word = %record.word, markers = stats.markers, "word added");
        SelectionOutcome::Added {
            record,
            markers: stats.markers,
        }
    }

    /// Soft-deletes `word` and removes its markers. Returns how many markers
    /// were restored to plain text.
    pub async fn delete(&mut self, word: &str) -> Result<usize, StorageError> {
        let word = canonical_word(word);
        self.store.delete_word(&word).await?;
        self.cache.remove(&word);
        let restored = self.unhighlight(&word);
        self.reload_words().await;
        info!(word = %word, restored, "word deleted");
        Ok(restored)
    }

    /// Resolves a definition, from the cache when fresh. A word the
    /// dictionary cannot explain is dropped from the list.
    pub async fn lookup(&mut self, word: &str) -> LookupOutcome {
        let word = canonical_word(word);
        match self.store.query_word(&word).await {
            Ok(Some(record)) if record.is_active() => {}
            Ok(_) => return LookupOutcome::Untracked,
            Err(err) => {
                warn!(error = %err, word = %word, "failed to read word before lookup");
                return LookupOutcome::Failed(err.to_string());
            }
        }

        if let Some(entry) = self.cache.get_at(&word, now()) {
            self.count_query(&word, None).await;
            return LookupOutcome::Definition {
                text: entry.definition,
                cached: true,
            };
        }

        match self.dictionary.lookup(&word).await {
            Ok(html) => match parse_definition(&html) {
                Some(definition) => {
                    self.cache.put_at(&word, definition.clone(), now());
                    self.count_query(&word, Some(&definition)).await;
                    LookupOutcome::Definition {
                        text: definition,
                        cached: false,
                    }
                }
                None => {
                    debug!(word = %word, "no definition found");
                    self.forget(&word).await;
                    LookupOutcome::NotFound
                }
            },
            Err(LookupError::Empty) => {
                debug!(word = %word, "dictionary has no entry");
                self.forget(&word).await;
                LookupOutcome::NotFound
            }
            Err(err) => {
                warn!(error = %err, word = %word, "dictionary lookup failed");
                self.forget(&word).await;
                LookupOutcome::Failed(err.to_string())
            }
        }
    }

    /// Returns `false` when `marker` is not a live marker.
    pub fn pointer_enter(&mut self, marker: P::Node, now: Instant) -> bool {
        if !self.page.is_connected(marker) {
            self.markers.states.remove(&marker);
            return false;
        }
        match self.markers.states.get_mut(&marker) {
            Some(state) => {
                state.hover.enter(now);
                true
            }
            None => false,
        }
    }

    pub fn pointer_leave(&mut self, marker: P::Node, now: Instant) -> bool {
        match self.markers.states.get_mut(&marker) {
            Some(state) => {
                state.hover.leave(now);
                true
            }
            None => false,
        }
    }

    /// Fires every hover deadline that has passed.
    pub async fn poll_timers(&mut self, now: Instant) -> Vec<PanelEvent<P::Node>> {
        self.prune_detached();
        let fired: Vec<(P::Node, HoverEffect)> = self
            .markers
            .states
            .iter_mut()
            .filter_map(|(marker, state)| state.hover.poll(now).map(|effect| (*marker, effect)))
            .collect();

        let mut events = Vec::with_capacity(fired.len());
        for (marker, effect) in fired {
            match effect {
                HoverEffect::Show => events.push(self.show_panel(marker).await),
                HoverEffect::Hide => {
                    let panel = self
                        .markers
                        .states
                        .get_mut(&marker)
                        .and_then(|state| state.panel.take());
                    if let Some(panel) = panel {
                        self.remove_panel(panel);
                    }
                    events.push(PanelEvent::Hidden { marker });
                }
            }
        }
        events
    }

    /// Feeds the page's own mutation journal to the watcher.
    pub fn observe_page(&mut self, now: Instant) -> BatchVerdict {
        let batch = self.page.take_mutations();
        self.observe(&batch, now)
    }

    /// Feeds a batch delivered by the host's mutation observer.
    pub fn observe(&mut self, batch: &[MutationRecord<P::Node>], now: Instant) -> BatchVerdict {
        if batch.iter().any(|record| !record.removed.is_empty()) {
            self.prune_detached();
        }
        self.watcher.observe(&self.page, batch, now)
    }

    /// Drops hover state for markers the page no longer contains.
    fn prune_detached(&mut self) {
        let page = &self.page;
        let before = self.markers.states.len();
        self.markers
            .states
            .retain(|marker, _| page.is_connected(*marker));
        let dropped = before - self.markers.states.len();
        if dropped > 0 {
            debug!(dropped, "forgot markers removed from the page");
        }
    }

    /// Highlights the nodes added during the last debounce window, if it has
    /// elapsed. `None` when nothing was due or the word list was unavailable.
    pub async fn flush_due(&mut self, now: Instant) -> Option<RewriteStats> {
        let nodes = self.watcher.take_due(now)?;
        match self.store.active_words().await {
            Ok(words) => {
                self.matcher = WordMatcher::new(words);
                let stats = self.rewriter.process_nodes(
                    &mut self.page,
                    &nodes,
                    &self.matcher,
                    &mut self.markers,
                );
                self.observe_page(now);
                self.watcher.finish(true);
                debug!(
                    roots = nodes.len(),
                    markers = stats.markers,
                    failed = stats.failed,
                    "processed new content"
                );
                Some(stats)
            }
            Err(err) => {
                warn!(error = %err, "failed to load words for new content");
                self.watcher.finish(false);
                None
            }
        }
    }

    /// Earliest pending debounce or hover deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.markers
            .states
            .values()
            .filter_map(|state| state.hover.deadline())
            .chain(self.watcher.deadline())
            .min()
    }

    /// Drives the controller from host events until `Shutdown` or until the
    /// sender is dropped.
    pub async fn run(&mut self, mut events: mpsc::Receiver<PageEvent<P::Node>>) {
        time::sleep(self.config.startup_delay).await;
        self.start().await;

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                event = events.recv() => match event {
                    None | Some(PageEvent::Shutdown) => break,
                    Some(event) => self.handle(event).await,
                },
                _ = sleep_until(deadline) => self.tick(now()).await,
            }
        }
        self.stop();
    }

    async fn handle(&mut self, event: PageEvent<P::Node>) {
        let now = now();
        match event {
            PageEvent::Mutations(batch) => {
                self.observe(&batch, now);
            }
            PageEvent::Selection(text) => {
                let outcome = self.select(&text).await;
                debug!(?outcome, "selection handled");
            }
            PageEvent::PointerEnter(marker) => {
                self.pointer_enter(marker, now);
            }
            PageEvent::PointerLeave(marker) => {
                self.pointer_leave(marker, now);
            }
            PageEvent::Delete(word) => {
                if let Err(err) = self.delete(&word).await {
                    warn!(error = %err, word = %word, "failed to delete word");
                }
            }
            PageEvent::Shutdown => {}
        }
        self.observe_page(now);
    }

    async fn tick(&mut self, now: Instant) {
        self.flush_due(now).await;
        for event in self.poll_timers(now).await {
            debug!(?event, "panel event");
        }
    }

    async fn show_panel(&mut self, marker: P::Node) -> PanelEvent<P::Node> {
        let Some(word) = self.markers.states.get(&marker).map(|state| state.word.clone()) else {
            return PanelEvent::Hidden { marker };
        };
        let (definition, cached) = match self.lookup(&word).await {
            LookupOutcome::Definition { text, cached } => (text, cached),
            outcome => {
                debug!(word = %word, ?outcome, "panel dismissed");
                return PanelEvent::Dismissed { marker, word };
            }
        };

        if let Some(panel) = self.mount_panel(marker, &definition) {
            if let Some(state) = self.markers.states.get_mut(&marker) {
                state.panel = Some(panel);
            }
        }
        PanelEvent::Shown(LookupPanel {
            marker,
            word,
            definition,
            cached,
            theme: self.theme,
        })
    }

    fn mount_panel(&mut self, marker: P::Node, definition: &str) -> Option<P::Node> {
        self.observe_page(now());
        let panel = self.page.create_element(
            "div",
            &[(ENGINE_ATTR, PANEL_VALUE), ("data-theme", self.theme.as_str())],
        );
        let body = self.page.create_text(definition);
        let mounted = self
            .page
            .append_child(panel, body)
            .and_then(|()| self.page.append_child(marker, panel));
        self.observe_page(now());
        match mounted {
            Ok(()) => Some(panel),
            Err(err) => {
                warn!(error = %err, "failed to mount panel");
                None
            }
        }
    }

    fn remove_panel(&mut self, panel: P::Node) {
        self.observe_page(now());
        if let Err(err) = self.page.remove_node(panel) {
            debug!(error = %err, "panel already gone");
        }
        self.observe_page(now());
    }

    async fn scan_page(&mut self) -> RewriteStats {
        let mut stats = RewriteStats::default();
        if self.matcher.is_empty() {
            return stats;
        }
        self.observe_page(now());
        let root = self.page.root();
        let nodes = self.rewriter.collect_text_nodes(&self.page, root);
        for chunk in nodes.chunks(self.config.chunk_size.max(1)) {
            stats.merge(self.rewriter.process_text_nodes(
                &mut self.page,
                chunk,
                &self.matcher,
                &mut self.markers,
            ));
            self.observe_page(now());
            tokio::task::yield_now().await;
        }
        stats
    }

    fn unhighlight(&mut self, word: &str) -> usize {
        self.observe_page(now());
        let root = self.page.root();
        let restored = self
            .rewriter
            .restore(&mut self.page, root, word, &mut self.markers);
        self.observe_page(now());
        restored
    }

    async fn forget(&mut self, word: &str) {
        if let Err(err) = self.delete(word).await {
            warn!(error = %err, word = %word, "failed to drop word after lookup");
        }
    }

    async fn count_query(&self, word: &str, definition: Option<&str>) {
        if let Err(err) = self.store.record_query(word, definition).await {
            warn!(error = %err, word = %word, "failed to record query");
        }
    }

    async fn reload_words(&mut self) {
        match self.store.active_words().await {
            Ok(words) => self.matcher = WordMatcher::new(words),
            Err(err) => warn!(error = %err, "failed to load word list"),
        }
    }
}

/// Current time on the tokio clock, so paused-time runs stay consistent.
fn now() -> Instant {
    time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STORAGE_KEY;
    use crate::dictionary::StaticDictionary;
    use crate::error::LookupError;
    use crate::page::{NodeId, Page};
    use crate::record::WordCollection;
    use crate::rewriter::WORD_ATTR;
    use crate::storage::MemoryStorage;

    type TestController = InteractionController<Page, MemoryStorage, StaticDictionary>;

    fn config() -> EngineConfig {
        EngineConfig {
            chunk_size: 2,
            ..EngineConfig::default()
        }
    }

    fn storage(words: &[&str]) -> MemoryStorage {
        let collection: WordCollection = words
            .iter()
            .map(|word| (word.to_string(), WordRecord::new(word)))
            .collect();
        MemoryStorage::with_collection(STORAGE_KEY, collection)
    }

    fn controller(html: &str, words: &[&str], dictionary: StaticDictionary) -> TestController {
        InteractionController::new(config(), Page::from_html(html), storage(words), dictionary)
    }

    fn markers_for(controller: &TestController, word: &str) -> Vec<NodeId> {
        let page = controller.page();
        page.find_by_attribute(page.root(), WORD_ATTR, word)
    }

    fn panels(controller: &TestController) -> Vec<NodeId> {
        let page = controller.page();
        page.find_by_attribute(page.root(), ENGINE_ATTR, PANEL_VALUE)
    }

    #[tokio::test]
    async fn start_highlights_whole_page_in_chunks() {
        let mut controller = controller(
            "<body><p>apple</p><p>pear</p><p>an apple and a pear</p><script>apple</script></body>",
            &["apple", "pear"],
            StaticDictionary::new(),
        );
        let stats = controller.start().await;
        assert_eq!(stats.scanned, 3);
        assert_eq!(stats.markers, 4);
        assert_eq!(markers_for(&controller, "apple").len(), 2);
        assert_eq!(controller.marker_count(), 4);
        assert!(controller.watcher().is_active());
        assert_eq!(controller.watcher().deadline(), None);
    }

    #[tokio::test]
    async fn selection_adds_word_and_rescans() {
        let mut controller = controller(
            "<body><p>Serendipity strikes. serendipity again.</p></body>",
            &[],
            StaticDictionary::new(),
        );
        controller.start().await;
        assert_eq!(controller.select("ab").await, SelectionOutcome::Rejected);

        let outcome = controller.select(" Serendipity ").await;
        let SelectionOutcome::Added { record, markers } = outcome.clone() else {
            panic!("expected word to be added, got {outcome:?}");
        };
        assert_eq!(record.word, "serendipity");
        assert_eq!(markers, 2);
        assert_eq!(markers_for(&controller, "serendipity").len(), 2);
        assert_eq!(controller.select("serendipity").await, SelectionOutcome::Rejected);
        // The engine's own edits never schedule a rescan.
        assert_eq!(controller.observe_page(now()), BatchVerdict::Ignored);
        assert_eq!(controller.watcher().deadline(), None);
    }

    #[tokio::test]
    async fn lookup_uses_cache_and_counts_every_query() {
        let mut controller = controller(
            "<body><p>an apple</p></body>",
            &["apple"],
            StaticDictionary::new().with_definition("apple", "n. 苹果; web. 苹果公司"),
        );
        controller.start().await;

        let first = controller.lookup("Apple").await;
        assert_eq!(
            first,
            LookupOutcome::Definition {
                text: "n. 苹果;\nweb. 苹果公司".into(),
                cached: false
            }
        );
        let second = controller.lookup("apple").await;
        assert!(matches!(second, LookupOutcome::Definition { cached: true, .. }));

        let record = controller.store().query_word("apple").await.unwrap().unwrap();
        assert_eq!(record.query_times, 3);
        assert_eq!(record.definition.as_deref(), Some("n. 苹果;\nweb. 苹果公司"));
        assert_eq!(controller.lookup("pear").await, LookupOutcome::Untracked);
    }

    #[tokio::test]
    async fn missing_definition_drops_the_word() {
        let mut controller = controller(
            "<body><p>a qwertyuiop here</p></body>",
            &["qwertyuiop"],
            StaticDictionary::new(),
        );
        controller.start().await;
        let before = controller.page().text_content(controller.page().root());
        assert_eq!(markers_for(&controller, "qwertyuiop").len(), 1);

        assert_eq!(controller.lookup("qwertyuiop").await, LookupOutcome::NotFound);
        assert!(markers_for(&controller, "qwertyuiop").is_empty());
        assert_eq!(controller.page().text_content(controller.page().root()), before);
        let record = controller.store().query_word("qwertyuiop").await.unwrap().unwrap();
        assert!(record.is_deleted);
        assert_eq!(record.query_times, 1);
        assert_eq!(record.delete_times, 1);
        assert!(!controller.matcher().contains("qwertyuiop"));
    }

    #[tokio::test]
    async fn failed_lookup_drops_the_word() {
        struct Offline;

        impl Dictionary for Offline {
            async fn lookup(&self, _word: &str) -> Result<String, LookupError> {
                Err(LookupError::Transport("network unreachable".into()))
            }
        }

        let mut controller = InteractionController::new(
            config(),
            Page::from_html("<body><p>an apple</p></body>"),
            storage(&["apple"]),
            Offline,
        );
        controller.start().await;
        let outcome = controller.lookup("apple").await;
        assert!(matches!(outcome, LookupOutcome::Failed(_)));
        assert_eq!(controller.marker_count(), 0);
        assert_eq!(controller.page().to_html(), "<p>an apple</p>");
    }

    #[tokio::test]
    async fn delete_restores_plain_text() {
        let mut controller = controller(
            "<body><p>apple and pear</p></body>",
            &["apple", "pear"],
            StaticDictionary::new(),
        );
        controller.start().await;
        assert_eq!(controller.delete("APPLE").await.unwrap(), 1);
        assert!(markers_for(&controller, "apple").is_empty());
        assert_eq!(markers_for(&controller, "pear").len(), 1);
        assert_eq!(controller.marker_count(), 1);
        assert_eq!(controller.delete("plum").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn new_content_is_highlighted_after_debounce() {
        let mut controller = controller(
            "<body><p>apple</p></body>",
            &["apple"],
            StaticDictionary::new(),
        );
        controller.start().await;
        let root = controller.page().root();
        controller
            .page_mut()
            .append_element_with_text(root, "div", "another apple")
            .unwrap();

        let start = now();
        let debounce = controller.config().debounce;
        assert!(matches!(
            controller.observe_page(start),
            BatchVerdict::Scheduled { .. }
        ));
        assert_eq!(controller.flush_due(start + debounce / 2).await, None);
        let stats = controller.flush_due(start + debounce).await.unwrap();
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.markers, 1);
        assert_eq!(markers_for(&controller, "apple").len(), 2);
        assert_eq!(controller.watcher().deadline(), None);
        assert_eq!(controller.flush_due(start + debounce * 4).await, None);
    }

    #[tokio::test]
    async fn text_added_to_a_stylesheet_stays_plain() {
        let mut controller = controller(
            "<body><style>.a{}</style><p>x</p></body>",
            &["apple"],
            StaticDictionary::new(),
        );
        controller.start().await;
        let root = controller.page().root();
        let style = controller.page().children(root)[0];
        let rule = controller.page_mut().create_text(".apple { color: red }");
        controller.page_mut().append_child(style, rule).unwrap();

        let start = now();
        let debounce = controller.config().debounce;
        controller.observe_page(start);
        if let Some(stats) = controller.flush_due(start + debounce).await {
            assert_eq!(stats.markers, 0);
        }
        assert_eq!(controller.marker_count(), 0);
        assert!(markers_for(&controller, "apple").is_empty());
        assert_eq!(
            controller.page().to_html(),
            "<style>.a{}.apple { color: red }</style><p>x</p>"
        );
    }

    #[tokio::test]
    async fn markers_removed_by_the_page_are_forgotten() {
        let mut controller = controller(
            "<body><div><p>an apple</p></div><p>apple</p></body>",
            &["apple"],
            StaticDictionary::new().with_definition("apple", "n. fruit"),
        );
        controller.start().await;
        assert_eq!(controller.marker_count(), 2);
        let root = controller.page().root();
        let div = controller.page().children(root)[0];
        let marker = markers_for(&controller, "apple")[0];
        let start = now();
        let delay = controller.config().hover_delay;

        // Hovered, then the page drops the subtree before the delay elapses.
        assert!(controller.pointer_enter(marker, start));
        controller.page_mut().remove_node(div).unwrap();
        assert!(controller.poll_timers(start + delay).await.is_empty());
        assert_eq!(controller.marker_count(), 1);
        assert!(panels(&controller).is_empty());
        assert!(!controller.pointer_enter(marker, start + delay));
        assert_eq!(controller.marker_word(marker), None);

        let record = controller.store().query_word("apple").await.unwrap().unwrap();
        assert_eq!(record.query_times, 1);
        assert!(controller.cache().get_at("apple", start + delay).is_none());

        // A removal seen through the journal prunes as well.
        let other = markers_for(&controller, "apple")[0];
        let second = controller.page().children(root)[0];
        controller.page_mut().remove_node(second).unwrap();
        controller.observe_page(start + delay);
        assert_eq!(controller.marker_count(), 0);
        assert!(!controller.pointer_enter(other, start + delay));
    }

    #[tokio::test]
    async fn hover_shows_and_hides_panel() {
        let mut controller = controller(
            "<body><p>an apple</p></body>",
            &["apple"],
            StaticDictionary::new().with_definition("apple", "n. fruit"),
        );
        controller.set_theme(Theme::Dark);
        controller.start().await;
        let marker = markers_for(&controller, "apple")[0];
        assert_eq!(controller.marker_word(marker), Some(("apple", "apple")));
        let start = now();
        let delay = controller.config().hover_delay;

        assert!(controller.pointer_enter(marker, start));
        assert_eq!(controller.next_deadline(), Some(start + delay));
        assert!(controller.poll_timers(start + delay / 2).await.is_empty());
        let events = controller.poll_timers(start + delay).await;
        assert_eq!(
            events,
            vec![PanelEvent::Shown(LookupPanel {
                marker,
                word: "apple".into(),
                definition: "n. fruit".into(),
                cached: false,
                theme: Theme::Dark,
            })]
        );
        let panel = panels(&controller);
        assert_eq!(panel.len(), 1);
        assert_eq!(
            controller.page().attribute(panel[0], "data-theme").as_deref(),
            Some("dark")
        );
        assert_eq!(controller.watcher().deadline(), None);

        let out = start + Duration::from_secs(1);
        assert!(controller.pointer_leave(marker, out));
        let events = controller.poll_timers(out + delay).await;
        assert_eq!(events, vec![PanelEvent::Hidden { marker }]);
        assert!(panels(&controller).is_empty());
        assert_eq!(controller.page().text_content(controller.page().root()), "an apple");
        assert!(!controller.pointer_enter(controller.page().root(), out));
    }

    #[tokio::test(start_paused = true)]
    async fn run_waits_for_startup_and_handles_events() {
        let mut controller = controller(
            "<body><p>An apple.</p><p>A pear.</p></body>",
            &["apple"],
            StaticDictionary::new(),
        );
        let (sender, receiver) = mpsc::channel(8);
        let began = time::Instant::now();

        let driver = async {
            sender
                .send(PageEvent::Selection("pear".into()))
                .await
                .unwrap();
            sender.send(PageEvent::Delete("apple".into())).await.unwrap();
            time::sleep(Duration::from_secs(5)).await;
            sender.send(PageEvent::Shutdown).await.unwrap();
        };
        tokio::join!(controller.run(receiver), driver);

        assert!(began.elapsed() >= controller.config().startup_delay);
        assert!(markers_for(&controller, "apple").is_empty());
        assert_eq!(markers_for(&controller, "pear").len(), 1);
        assert!(!controller.watcher().is_active());
    }
}
