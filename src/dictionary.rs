//! Dictionary collaborator and parsing of its HTML responses.

use crate::error::LookupError;
use once_cell::sync::Lazy;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;

const LOOKUP_ENDPOINT: &str = "https://cn.bing.com/dict/clientsearch?mkt=zh-CN&setLang=zh&form=BDVEHC&ClientVer=BDDTV3.5.1.4320&q=";

static DEFINITION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#clientnewword").expect("definition selector"));

/// Whitespace, then a short alphabetic token ending in a period.
static PART_OF_SPEECH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s([A-Za-z]+\.)").expect("part of speech regex"));

/// Remote dictionary returning a raw HTML fragment for a word.
#[allow(async_fn_in_trait)]
pub trait Dictionary {
    async fn lookup(&self, word: &str) -> Result<String, LookupError>;
}

/// Canned responses keyed by lowercase word. Useful for offline runs and
/// tests; unknown words fail with [`LookupError::Empty`].
#[derive(Debug, Clone, Default)]
pub struct StaticDictionary {
    pages: HashMap<String, String>,
}

impl StaticDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definition(mut self, word: &str, definition: &str) -> Self {
        self.insert_definition(word, definition);
        self
    }

    pub fn insert_definition(&mut self, word: &str, definition: &str) {
        self.pages
            .insert(word.to_lowercase(), definition_fragment(definition));
    }

    pub fn insert_page(&mut self, word: &str, html: impl Into<String>) {
        self.pages.insert(word.to_lowercase(), html.into());
    }
}

impl Dictionary for StaticDictionary {
    async fn lookup(&self, word: &str) -> Result<String, LookupError> {
        self.pages
            .get(&word.to_lowercase())
            .cloned()
            .ok_or(LookupError::Empty)
    }
}

/// URL of the client-search page the extension background fetches.
pub fn lookup_url(word: &str) -> String {
    let encoded = utf8_percent_encode(word.trim(), NON_ALPHANUMERIC);
    format!("{LOOKUP_ENDPOINT}{encoded}")
}

/// Extracts the definition carried by the `#clientnewword` element and puts
/// each part of speech on its own line. `None` means the word is unknown to
/// the dictionary.
pub fn parse_definition(html: &str) -> Option<String> {
    if html.trim().is_empty() {
        return None;
    }
    let document = Html::parse_fragment(html);
    let raw = document
        .select(&DEFINITION_SELECTOR)
        .next()?
        .value()
        .attr("data-definition")?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(format_parts_of_speech(raw))
}

/// Inserts a line break before every part-of-speech abbreviation (`n.`,
/// `adj.`, `web.`...) that sits between whitespace. Whitespace in front of
/// the break is dropped so no line ends in a trailing space.
pub fn format_parts_of_speech(definition: &str) -> String {
    let mut out = String::with_capacity(definition.len() + 8);
    let mut last = 0;
    for caps in PART_OF_SPEECH.captures_iter(definition) {
        let Some(token) = caps.get(1) else {
            continue;
        };
        let followed_by_space = definition[token.end()..]
            .chars()
            .next()
            .is_some_and(char::is_whitespace);
        if !followed_by_space {
            continue;
        }
        out.push_str(definition[last..token.start()].trim_end());
        out.push('\n');
        last = token.start();
    }
    out.push_str(&definition[last..]);
    out
}

/// Smallest page [`parse_definition`] accepts.
pub fn definition_fragment(definition: &str) -> String {
    let escaped = definition
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;");
    format!(r#"<div id="clientnewword" data-definition="{escaped}"></div>"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_url_encodes_the_word() {
        let url = lookup_url(" well-known ");
        assert!(url.starts_with("https://cn.bing.com/dict/clientsearch?"));
        assert!(url.ends_with("&q=well%2Dknown"));
        assert!(lookup_url("a b&c").ends_with("&q=a%20b%26c"));
    }

    #[test]
    fn parses_definition_attribute() {
        let html = r#"<html><body><div class="x"><span id="clientnewword" data-definition="n. 苹果; web. 苹果公司"></span></div></body></html>"#;
        assert_eq!(
            parse_definition(html).as_deref(),
            Some("n. 苹果;\nweb. 苹果公司")
        );
    }

    #[test]
    fn missing_element_or_attribute_means_unknown() {
        assert_eq!(parse_definition(""), None);
        assert_eq!(parse_definition("<div>no result</div>"), None);
        assert_eq!(parse_definition(r#"<div id="clientnewword"></div>"#), None);
        assert_eq!(
            parse_definition(r#"<div id="clientnewword" data-definition="  "></div>"#),
            None
        );
    }

    #[test]
    fn parts_of_speech_move_to_their_own_lines() {
        assert_eq!(
            format_parts_of_speech("n. 基础设施; adj. 基础的 v. 建设"),
            "n. 基础设施;\nadj. 基础的\nv. 建设"
        );
        // Only abbreviations followed by whitespace count.
        assert_eq!(format_parts_of_speech("see e.g.x here"), "see e.g.x here");
        assert_eq!(format_parts_of_speech("ends with etc."), "ends with etc.");
        assert_eq!(format_parts_of_speech("plain text"), "plain text");
    }

    #[test]
    fn definition_fragment_round_trips_through_parser() {
        let html = definition_fragment(r#"n. "quoted" & <b>"#);
        assert_eq!(
            parse_definition(&html).as_deref(),
            Some(r#"n. "quoted" & <b>"#)
        );
    }

    #[tokio::test]
    async fn static_dictionary_serves_pages() {
        let dictionary = StaticDictionary::new().with_definition("Apple", "n. fruit");
        let html = dictionary.lookup("APPLE").await.unwrap();
        assert_eq!(parse_definition(&html).as_deref(), Some("n. fruit"));
        assert_eq!(dictionary.lookup("pear").await, Err(LookupError::Empty));
    }
}
