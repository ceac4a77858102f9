//! Marker insertion and removal over a [`TextSource`].

use crate::error::DomError;
use crate::matcher::WordMatcher;
use crate::page::TextSource;
use tracing::{debug, warn};

/// Present on every node the engine creates. The watcher filters on it alone.
pub const ENGINE_ATTR: &str = "data-wordglow";
pub const MARKER_VALUE: &str = "marker";
pub const PANEL_VALUE: &str = "panel";
/// Canonical word carried by a marker.
pub const WORD_ATTR: &str = "data-word";

/// Inline style that keeps a marker from affecting surrounding layout.
pub const MARKER_STYLE: &str = "display:inline;vertical-align:baseline;margin:0;padding:0;\
border:none;background:none;color:inherit;font:inherit;position:relative";

/// Elements whose text is never page prose.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "textarea", "template"];

/// Receives markers as they are created and removed, so an interactive layer
/// can attach hover behavior to them.
pub trait MarkerHost<N> {
    fn mount(&mut self, marker: N, word: &str, display: &str);

    fn unmount(&mut self, marker: N);
}

impl<N> MarkerHost<N> for () {
    fn mount(&mut self, _marker: N, _word: &str, _display: &str) {}

    fn unmount(&mut self, _marker: N) {}
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    pub scanned: usize,
    pub rewritten: usize,
    pub markers: usize,
    pub failed: usize,
}

impl RewriteStats {
    pub fn merge(&mut self, other: RewriteStats) {
        self.scanned += other.scanned;
        self.rewritten += other.rewritten;
        self.markers += other.markers;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone)]
pub struct DomRewriter {
    marker_tag: String,
}

impl Default for DomRewriter {
    fn default() -> Self {
        Self::new("span")
    }
}

impl DomRewriter {
    pub fn new(marker_tag: impl Into<String>) -> Self {
        Self {
            marker_tag: marker_tag.into(),
        }
    }

    /// Wraps every tracked word in `node` with a marker.
    ///
    /// Returns the number of markers created. Blank nodes, detached nodes and
    /// nodes whose parent already holds a marker are left alone, so running
    /// this twice on the same node is a no-op.
    pub fn process_text_node<S, H>(
        &self,
        source: &mut S,
        node: S::Node,
        matcher: &WordMatcher,
        host: &mut H,
    ) -> Result<usize, DomError>
    where
        S: TextSource,
        H: MarkerHost<S::Node>,
    {
        let Some(text) = source.text(node) else {
            return Ok(0);
        };
        if text.trim().is_empty() || !source.is_connected(node) {
            return Ok(0);
        }
        let Some(parent) = source.parent(node) else {
            return Ok(0);
        };
        if has_engine_ancestor(source, parent)
            || has_skipped_ancestor(source, parent)
            || contains_marker(source, parent)
        {
            return Ok(0);
        }

        let spans = matcher.find_matches(&text);
        if spans.is_empty() {
            return Ok(0);
        }

        let mut fragment = Vec::with_capacity(spans.len() * 2 + 1);
        let mut markers = Vec::with_capacity(spans.len());
        let mut last = 0;
        for span in &spans {
            if span.start > last {
                fragment.push(source.create_text(&text[last..span.start]));
            }
            let word = span.word();
            let marker = source.create_element(
                &self.marker_tag,
                &[
                    (ENGINE_ATTR, MARKER_VALUE),
                    (WORD_ATTR, word.as_str()),
                    ("style", MARKER_STYLE),
                ],
            );
            let label = source.create_text(&span.matched_text);
            source.append_child(marker, label)?;
            fragment.push(marker);
            markers.push((marker, word, span.matched_text.as_str()));
            last = span.end;
        }
        if last < text.len() {
            fragment.push(source.create_text(&text[last..]));
        }

        source.replace_node(node, &fragment)?;
        for (marker, word, display) in &markers {
            host.mount(*marker, word, display);
        }
        Ok(markers.len())
    }

    /// Puts plain text back in place of every marker for `word` under
    /// `container`. Returns how many markers were removed.
    pub fn restore<S, H>(
        &self,
        source: &mut S,
        container: S::Node,
        word: &str,
        host: &mut H,
    ) -> usize
    where
        S: TextSource,
        H: MarkerHost<S::Node>,
    {
        let word = word.trim().to_lowercase();
        let mut markers = Vec::new();
        collect_markers(source, container, &word, &mut markers);

        let mut restored = 0;
        for marker in markers.into_iter().rev() {
            let text = visible_text(source, marker);
            let replacement = source.create_text(&text);
            match source.replace_node(marker, &[replacement]) {
                Ok(()) => {
                    host.unmount(marker);
                    restored += 1;
                }
                Err(err) => warn!(error = %err, word = %word, "failed to restore marker"),
            }
        }
        if restored > 0 {
            debug!(word = %word, restored, "restored markers");
        }
        restored
    }

    /// Text nodes under `root` in document order, skipping engine-owned
    /// subtrees and non-content elements.
    pub fn collect_text_nodes<S: TextSource>(&self, source: &S, root: S::Node) -> Vec<S::Node> {
        let mut found = Vec::new();
        if has_engine_ancestor(source, root) || has_skipped_ancestor(source, root) {
            return found;
        }
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if let Some(text) = source.text(node) {
                if !text.trim().is_empty() {
                    found.push(node);
                }
                continue;
            }
            if is_engine_node(source, node) || is_skipped(source, node) {
                continue;
            }
            let mut children = source.children(node);
            children.reverse();
            stack.extend(children);
        }
        found
    }

    /// Processes already collected text nodes. A node that fails (typically
    /// removed by a page script in the meantime) is logged and skipped.
    pub fn process_text_nodes<S, H>(
        &self,
        source: &mut S,
        nodes: &[S::Node],
        matcher: &WordMatcher,
        host: &mut H,
    ) -> RewriteStats
    where
        S: TextSource,
        H: MarkerHost<S::Node>,
    {
        let mut stats = RewriteStats::default();
        for node in nodes {
            stats.scanned += 1;
            match self.process_text_node(source, *node, matcher, host) {
                Ok(0) => {}
                Ok(count) => {
                    stats.rewritten += 1;
                    stats.markers += count;
                }
                Err(err) => {
                    stats.failed += 1;
                    warn!(error = %err, node = ?node, "failed to rewrite text node");
                }
            }
        }
        stats
    }

    /// Walks each root for text nodes and processes them.
    pub fn process_nodes<S, H>(
        &self,
        source: &mut S,
        roots: &[S::Node],
        matcher: &WordMatcher,
        host: &mut H,
    ) -> RewriteStats
    where
        S: TextSource,
        H: MarkerHost<S::Node>,
    {
        let mut stats = RewriteStats::default();
        for root in roots {
            if !source.is_connected(*root) {
                continue;
            }
            let nodes = self.collect_text_nodes(source, *root);
            stats.merge(self.process_text_nodes(source, &nodes, matcher, host));
        }
        stats
    }
}

pub fn is_engine_node<S: TextSource>(source: &S, node: S::Node) -> bool {
    source.attribute(node, ENGINE_ATTR).is_some()
}

pub fn is_marker<S: TextSource>(source: &S, node: S::Node) -> bool {
    source.attribute(node, ENGINE_ATTR).as_deref() == Some(MARKER_VALUE)
}

/// Whether `node` or any of its ancestors was created by the engine.
pub fn has_engine_ancestor<S: TextSource>(source: &S, node: S::Node) -> bool {
    let mut current = Some(node);
    while let Some(candidate) = current {
        if is_engine_node(source, candidate) {
            return true;
        }
        current = source.parent(candidate);
    }
    false
}

fn is_skipped<S: TextSource>(source: &S, node: S::Node) -> bool {
    source
        .tag_name(node)
        .is_some_and(|tag| SKIPPED_TAGS.contains(&tag.as_str()))
}

/// Whether `node` sits inside (or is) a script, style or other
/// non-content element.
fn has_skipped_ancestor<S: TextSource>(source: &S, node: S::Node) -> bool {
    let mut current = Some(node);
    while let Some(candidate) = current {
        if is_skipped(source, candidate) {
            return true;
        }
        current = source.parent(candidate);
    }
    false
}

fn contains_marker<S: TextSource>(source: &S, node: S::Node) -> bool {
    let mut stack = source.children(node);
    while let Some(current) = stack.pop() {
        if is_marker(source, current) {
            return true;
        }
        stack.extend(source.children(current));
    }
    false
}

fn collect_markers<S: TextSource>(source: &S, node: S::Node, word: &str, out: &mut Vec<S::Node>) {
    if is_marker(source, node) {
        if source.attribute(node, WORD_ATTR).as_deref() == Some(word) {
            out.push(node);
        }
        return;
    }
    for child in source.children(node) {
        collect_markers(source, child, word, out);
    }
}

/// Text of a marker without any panel mounted inside it.
fn visible_text<S: TextSource>(source: &S, marker: S::Node) -> String {
    let mut out = String::new();
    for child in source.children(marker) {
        if is_engine_node(source, child) {
            continue;
        }
        out.push_str(&source.text_content(child));
    }
    out
}
