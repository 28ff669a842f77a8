use std::collections::{BTreeMap, HashSet};

use harvest_core::canonical::resolve_link;
use log::debug;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

/// Collapse runs of whitespace into single spaces and trim
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleaned text content of an element
pub fn element_text(element: &ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            debug!("Ignoring invalid selector '{}': {:?}", css, e);
            None
        }
    }
}

/// A parsed HTML document together with the URL it was fetched from.
///
/// All helpers are infallible: an invalid selector or a missing element
/// simply yields nothing.
pub struct ParsedContent {
    document: Html,
    url: Url,
    size: usize,
}

impl ParsedContent {
    /// Parse an HTML document
    pub fn parse(body: &str, url: Url) -> Self {
        Self {
            document: Html::parse_document(body),
            url,
            size: body.len(),
        }
    }

    /// Parse raw bytes, replacing invalid UTF-8
    pub fn from_bytes(body: &[u8], url: Url) -> Self {
        let text = String::from_utf8_lossy(body);
        let mut parsed = Self::parse(&text, url);
        parsed.size = body.len();
        parsed
    }

    /// The URL the document was fetched from
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The underlying DOM
    pub fn document(&self) -> &Html {
        &self.document
    }

    /// Size of the raw body in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// All elements matching a CSS selector
    pub fn select(&self, css: &str) -> Vec<ElementRef<'_>> {
        let Some(selector) = selector(css) else {
            return Vec::new();
        };
        let elements = self.document.select(&selector).collect();
        elements
    }

    /// The first element matching a CSS selector
    pub fn select_first(&self, css: &str) -> Option<ElementRef<'_>> {
        let selector = selector(css)?;
        let first = self.document.select(&selector).next();
        first
    }

    /// Whether any element matches a CSS selector
    pub fn exists(&self, css: &str) -> bool {
        self.select_first(css).is_some()
    }

    /// Text of the first matching element that has any
    pub fn select_text(&self, css: &str) -> Option<String> {
        self.select(css)
            .iter()
            .map(element_text)
            .find(|text| !text.is_empty())
    }

    /// Non-empty texts of all matching elements
    pub fn select_texts(&self, css: &str) -> Vec<String> {
        self.select(css)
            .iter()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect()
    }

    /// Attribute of the first matching element that carries it
    pub fn select_attr(&self, css: &str, attr: &str) -> Option<String> {
        self.select(css)
            .iter()
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Content of a `<meta>` tag, looked up by `name` or `property`
    pub fn meta(&self, key: &str) -> Option<String> {
        self.select("meta[content]").into_iter().find_map(|el| {
            let value = el.value();
            let matches = [value.attr("name"), value.attr("property")]
                .into_iter()
                .flatten()
                .any(|k| k.eq_ignore_ascii_case(key));
            matches.then(|| value.attr("content").unwrap_or_default().trim().to_string())
        })
    }

    /// All `<meta>` tags keyed by `name`, or by `property` when there is no name
    pub fn meta_tags(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        for el in self.select("meta[content]") {
            let value = el.value();
            if let Some(key) = value.attr("name").or_else(|| value.attr("property")) {
                tags.entry(key.to_string())
                    .or_insert_with(|| value.attr("content").unwrap_or_default().to_string());
            }
        }
        tags
    }

    /// JSON-LD objects embedded in the page.
    ///
    /// Top-level arrays and `@graph` containers are flattened; scripts that
    /// are not valid JSON are skipped.
    pub fn json_ld(&self) -> Vec<Value> {
        let mut objects = Vec::new();
        for script in self.select(r#"script[type="application/ld+json"]"#) {
            let raw = script.text().collect::<String>();
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => flatten_json_ld(value, &mut objects),
                Err(e) => debug!("Skipping malformed JSON-LD on {}: {}", self.url, e),
            }
        }
        objects
    }

    /// The first JSON-LD object whose `@type` is one of `types`
    pub fn json_ld_of_type(&self, types: &[&str]) -> Option<Value> {
        self.json_ld()
            .into_iter()
            .find(|object| json_ld_types(object).iter().any(|t| types.contains(&t.as_str())))
    }

    /// The document `<title>`
    pub fn title(&self) -> Option<String> {
        self.select_text("title")
    }

    /// Base for relative links: `<base href>` if present, else the page URL
    pub fn base_url(&self) -> Url {
        self.select_attr("base[href]", "href")
            .and_then(|href| self.url.join(&href).ok())
            .unwrap_or_else(|| self.url.clone())
    }

    /// Resolve a reference found in the page to a normalized absolute URL
    pub fn resolve(&self, href: &str) -> Option<Url> {
        resolve_link(&self.base_url(), href)
    }

    /// Normalized outbound links from `<a>` and `<area>` elements, in
    /// document order and without duplicates
    pub fn links(&self) -> Vec<Url> {
        let base = self.base_url();
        let mut seen = HashSet::new();
        self.select("a[href], area[href]")
            .iter()
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| resolve_link(&base, href))
            .filter(|url| seen.insert(url.to_string()))
            .collect()
    }

    /// Visible text of the body
    pub fn text_content(&self) -> String {
        match self.select_first("body") {
            Some(body) => element_text(&body),
            None => element_text(&self.document.root_element()),
        }
    }

    /// Headings `h1` to `h3` as `(level, text)` pairs in document order
    pub fn headings(&self) -> Vec<(u8, String)> {
        self.select("h1, h2, h3")
            .iter()
            .filter_map(|el| {
                let level = el.value().name().strip_prefix('h')?.parse().ok()?;
                let text = element_text(el);
                (!text.is_empty()).then_some((level, text))
            })
            .collect()
    }

    /// The first main content container, if the page has one
    pub fn main_content(&self) -> Option<ElementRef<'_>> {
        [
            "main",
            "article",
            "#content",
            "#main",
            ".content",
            ".main",
            ".post",
            ".entry",
            r#"[role="main"]"#,
        ]
        .iter()
        .find_map(|css| self.select_first(css))
    }
}

fn flatten_json_ld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_json_ld(item, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_json_ld(graph, out);
            }
            if map.keys().any(|k| k != "@context") {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

/// The `@type` of a JSON-LD object, which may be a string or a list
pub fn json_ld_types(object: &Value) -> Vec<String> {
    match object.get("@type") {
        Some(Value::String(t)) => vec![t.clone()],
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Turns a fetched body into a [`ParsedContent`].
///
/// The crawler holds one of these so tests can substitute their own parsing.
pub trait ContentParser: Send + Sync + 'static {
    /// Parse a document fetched from `url`
    fn parse(&self, body: &[u8], url: &Url) -> ParsedContent;
}

/// HTML parser backed by html5ever
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlParser;

impl ContentParser for HtmlParser {
    fn parse(&self, body: &[u8], url: &Url) -> ParsedContent {
        ParsedContent::from_bytes(body, url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html>
          <head>
            <title>  Hello
              World </title>
            <meta name="description" content="A test page">
            <meta property="og:type" content="article">
            <script type="application/ld+json">
              {"@context": "https://schema.org", "@graph": [
                {"@type": "WebSite", "name": "Site"},
                {"@type": ["Product", "Thing"], "name": "Widget"}
              ]}
            </script>
            <script type="application/ld+json">{not json</script>
          </head>
          <body>
            <h1>Main</h1>
            <h2>Sub</h2>
            <a href="/about/">About</a>
            <a href="https://other.test/x#frag">Other</a>
            <a href="#top">Top</a>
            <a href="mailto:me@a.test">Mail</a>
            <a href="javascript:void(0)">Js</a>
            <a href="/about">About again</a>
            <map><area href="/area"></map>
          </body>
        </html>"##;

    fn parsed() -> ParsedContent {
        ParsedContent::parse(PAGE, Url::parse("http://a.test/dir/page").unwrap())
    }

    #[test]
    fn test_title_and_meta() {
        let page = parsed();
        assert_eq!(page.title().as_deref(), Some("Hello World"));
        assert_eq!(page.meta("description").as_deref(), Some("A test page"));
        assert_eq!(page.meta("og:type").as_deref(), Some("article"));
        assert!(page.meta("keywords").is_none());
        assert_eq!(page.meta_tags().len(), 2);
    }

    #[test]
    fn test_json_ld_flattens_graph_and_skips_garbage() {
        let page = parsed();
        let objects = page.json_ld();
        assert_eq!(objects.len(), 2);

        let product = page.json_ld_of_type(&["Product"]).unwrap();
        assert_eq!(product["name"], "Widget");
        assert!(page.json_ld_of_type(&["NewsArticle"]).is_none());
    }

    #[test]
    fn test_links_are_resolved_filtered_and_deduplicated() {
        let links: Vec<String> = parsed().links().iter().map(|u| u.to_string()).collect();
        assert_eq!(
            links,
            vec!["http://a.test/about", "https://other.test/x", "http://a.test/area"]
        );
    }

    #[test]
    fn test_base_href_changes_resolution() {
        let html = r#"<html><head><base href="http://cdn.test/root/"></head>
            <body><a href="page">p</a></body></html>"#;
        let page = ParsedContent::parse(html, Url::parse("http://a.test/").unwrap());
        assert_eq!(page.links()[0].as_str(), "http://cdn.test/root/page");
    }

    #[test]
    fn test_headings_and_text() {
        let page = parsed();
        assert_eq!(page.headings(), vec![(1, "Main".to_string()), (2, "Sub".to_string())]);
        assert!(page.text_content().starts_with("Main Sub About"));
    }

    #[test]
    fn test_invalid_selector_yields_nothing() {
        let page = parsed();
        assert!(page.select("[[[").is_empty());
        assert!(page.select_text("[[[").is_none());
    }

    #[test]
    fn test_html_parser_tolerates_invalid_utf8() {
        let body = b"<html><title>caf\xe9</title></html>";
        let page = HtmlParser.parse(body, &Url::parse("http://a.test/").unwrap());
        assert_eq!(page.size(), body.len());
        assert!(page.title().unwrap().starts_with("caf"));
    }
}
