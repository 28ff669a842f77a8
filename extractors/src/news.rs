use harvest_core::error::Result;
use harvest_core::record::FieldMap;
use harvest_core::chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::extractor::{ld_image, ld_list, ld_name, ld_text, put, put_missing, Extractor};
use crate::parsed::{element_text, ParsedContent};

const FIELDS: &[&str] = &[
    "headline",
    "authors",
    "date_published",
    "publisher",
    "description",
    "content",
];

const ARTICLE_TYPES: &[&str] = &["NewsArticle", "Article", "Report", "BlogPosting"];

const ARTICLE_PATHS: &[&str] = &["/article/", "/story/", "/news/", "/post/"];

/// Article bodies shorter than this do not count as evidence of an article
const MIN_ARTICLE_CHARS: usize = 500;

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    r#"[itemprop="articleBody"]"#,
    ".article-content",
    ".article-body",
    ".story-body",
    ".story-content",
    ".news-content",
    ".entry-content",
    ".post-content",
    "#article-body",
    ".content-main",
    ".main-content",
    ".story__content",
    ".wysiwyg",
];

const AUTHOR_SELECTORS: &[&str] = &[
    r#"[itemprop="author"]"#,
    ".author",
    ".byline",
    ".article-author",
    ".story-author",
    ".entry-author",
    ".post-author",
    r#"[rel="author"]"#,
    ".article__author",
    ".story__author",
    ".c-byline__author",
];

const DATE_SELECTORS: &[&str] = &[
    r#"[itemprop="datePublished"]"#,
    ".pub-date",
    ".published-date",
    ".article-date",
    ".post-date",
    ".entry-date",
    ".date",
    ".story-date",
    ".article__date",
    ".c-byline__date",
    "time",
];

const SUBHEADLINE_SELECTORS: &[&str] = &[
    ".sub-headline",
    ".subheadline",
    ".article-subheadline",
    ".article-subtitle",
    ".article-deck",
    ".article-summary",
    ".story-deck",
    ".kicker",
];

const CATEGORY_SELECTORS: &[&str] = &[
    r#"[itemprop="articleSection"]"#,
    ".article-category",
    ".article-section",
    ".category",
    ".article__section",
    ".story__section",
];

const TAG_SELECTORS: &[&str] = &[
    ".article-tags a",
    ".tags a",
    ".article-topics a",
    ".topics a",
    r#"[rel="tag"]"#,
];

const PUBLISHER_SELECTORS: &[&str] = &[
    r#"[itemprop="publisher"] [itemprop="name"]"#,
    r#"[itemprop="publisher"]"#,
    ".publisher",
    ".site-name",
    ".publication",
];

static BYLINE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^by\s+").expect("valid byline regex"));

static AUTHOR_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i),\s*|\s+and\s+").expect("valid author separator regex"));

/// News articles and blog posts: headline, authors, dates and body text
#[derive(Debug, Default, Clone, Copy)]
pub struct NewsExtractor;

impl NewsExtractor {
    pub fn new() -> Self {
        Self
    }

    fn from_structured_data(&self, content: &ParsedContent, fields: &mut FieldMap) {
        let Some(article) = content.json_ld_of_type(ARTICLE_TYPES) else {
            return;
        };

        put(fields, "headline", ld_text(article.get("headline")));
        put(fields, "description", ld_text(article.get("description")));

        let authors: Vec<Value> = ld_list(article.get("author"))
            .into_iter()
            .filter_map(|author| ld_name(Some(author)))
            .map(Value::from)
            .collect();
        put(fields, "authors", authors);

        if let Some(published) = ld_text(article.get("datePublished")) {
            put(fields, "date_published_formatted", format_date(&published));
            put(fields, "date_published", published);
        }
        put(fields, "date_modified", ld_text(article.get("dateModified")));
        put(fields, "publisher", ld_name(article.get("publisher")));
        put(
            fields,
            "main_image",
            ld_list(article.get("image")).first().and_then(|image| ld_image(image)),
        );

        let categories: Vec<Value> = ld_list(article.get("articleSection"))
            .into_iter()
            .filter_map(|section| ld_text(Some(section)))
            .map(Value::from)
            .collect();
        put(fields, "categories", categories);

        let tags: Vec<Value> = match article.get("keywords") {
            Some(Value::String(keywords)) => split_list(keywords),
            Some(Value::Array(keywords)) => keywords
                .iter()
                .filter_map(|k| ld_text(Some(k)))
                .map(Value::from)
                .collect(),
            _ => Vec::new(),
        };
        put(fields, "tags", tags);
    }

    fn from_html(&self, content: &ParsedContent, fields: &mut FieldMap) {
        put_missing(
            fields,
            "headline",
            content.select_text("h1").or_else(|| content.meta("og:title")),
        );
        put_missing(
            fields,
            "subheadline",
            SUBHEADLINE_SELECTORS.iter().find_map(|css| content.select_text(css)),
        );
        put_missing(
            fields,
            "description",
            content
                .meta("description")
                .or_else(|| content.meta("og:description")),
        );
        put_missing(fields, "authors", self.authors(content));

        if !fields.contains_key("date_published") {
            if let Some(published) = self.published(content) {
                put(fields, "date_published_formatted", format_date(&published));
                put(fields, "date_published", published);
            }
        }

        let categories: Vec<Value> = dedup(
            CATEGORY_SELECTORS
                .iter()
                .flat_map(|css| content.select_texts(css))
                .filter(|c| !matches!(c.to_lowercase().as_str(), "home" | "homepage" | "index")),
        );
        put_missing(fields, "categories", categories);

        let tags: Vec<Value> = dedup(
            TAG_SELECTORS
                .iter()
                .flat_map(|css| content.select_texts(css))
                .filter(|t| t.chars().count() > 1),
        );
        put_missing(fields, "tags", tags);

        put_missing(
            fields,
            "publisher",
            PUBLISHER_SELECTORS
                .iter()
                .find_map(|css| content.select_text(css))
                .or_else(|| content.meta("og:site_name")),
        );
        put_missing(
            fields,
            "main_image",
            content
                .meta("og:image")
                .and_then(|src| content.resolve(&src))
                .map(|url| url.to_string()),
        );
    }

    fn authors(&self, content: &ParsedContent) -> Vec<Value> {
        let names = AUTHOR_SELECTORS
            .iter()
            .flat_map(|css| content.select_texts(css))
            .filter(|text| text.chars().count() > 2)
            .flat_map(|text| {
                let text = BYLINE_PREFIX.replace(&text, "").into_owned();
                AUTHOR_SEPARATOR
                    .split(&text)
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            });
        dedup(names)
    }

    fn published(&self, content: &ParsedContent) -> Option<String> {
        DATE_SELECTORS.iter().find_map(|css| {
            let element = content.select_first(css)?;
            let value = element.value();
            value
                .attr("datetime")
                .or_else(|| value.attr("content"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or_else(|| Some(element_text(&element)).filter(|t| !t.is_empty()))
        })
    }

    /// Paragraph text of the article body
    fn body(&self, content: &ParsedContent) -> Option<String> {
        let container = CONTENT_SELECTORS
            .iter()
            .find_map(|css| content.select_first(css))
            .or_else(|| content.main_content())?;
        let paragraph = scraper::Selector::parse("p").ok()?;
        let paragraphs: Vec<String> = container
            .select(&paragraph)
            .map(|p| element_text(&p))
            .filter(|text| !text.is_empty())
            .collect();
        let text = if paragraphs.is_empty() {
            element_text(&container)
        } else {
            paragraphs.join("\n\n")
        };
        (!text.is_empty()).then_some(text)
    }
}

fn split_list(raw: &str) -> Vec<Value> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Value::from)
        .collect()
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<Value> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out.into_iter().map(Value::from).collect()
}

/// Render a publication date as `YYYY-MM-DD HH:MM:SS` when it is in a
/// recognisable format
fn format_date(raw: &str) -> Option<String> {
    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.format(FORMAT).to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.format(FORMAT).to_string());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(dt.format(FORMAT).to_string());
        }
    }
    for pattern in ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, pattern) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.format(FORMAT).to_string());
        }
    }
    None
}

impl Extractor for NewsExtractor {
    fn name(&self) -> &str {
        "news"
    }

    fn fields(&self) -> &[&'static str] {
        FIELDS
    }

    fn can_extract(&self, content: &ParsedContent, url: &Url) -> bool {
        if content.json_ld_of_type(ARTICLE_TYPES).is_some() {
            return true;
        }

        let path = url.path().to_lowercase();
        if ARTICLE_PATHS.iter().any(|p| path.contains(p)) {
            return true;
        }

        let long_body = CONTENT_SELECTORS.iter().any(|css| {
            content
                .select_first(css)
                .is_some_and(|el| el.text().map(str::trim).map(str::len).sum::<usize>() > MIN_ARTICLE_CHARS)
        });
        if long_body {
            return true;
        }

        AUTHOR_SELECTORS.iter().any(|css| content.exists(css))
            && DATE_SELECTORS.iter().any(|css| content.exists(css))
    }

    fn extract(&self, content: &ParsedContent, _url: &Url) -> Result<FieldMap> {
        let mut fields = FieldMap::new();
        self.from_structured_data(content, &mut fields);
        self.from_html(content, &mut fields);

        if let Some(body) = self.body(content) {
            fields.insert("word_count".into(), body.split_whitespace().count().into());
            fields.insert("content".into(), body.into());
        }

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(html: &str, url: &str) -> (ParsedContent, Url) {
        let url = Url::parse(url).unwrap();
        (ParsedContent::parse(html, url.clone()), url)
    }

    #[test]
    fn test_json_ld_article() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@type": "NewsArticle", "headline": "Rust 2.0 announced",
             "author": [{"@type": "Person", "name": "Ada"}, "Grace"],
             "datePublished": "2024-03-01T10:30:00Z",
             "publisher": {"@type": "Organization", "name": "Daily Bit"},
             "image": {"url": "http://a.test/lead.jpg"},
             "articleSection": "Tech", "keywords": "rust, compilers"}
            </script></head>
            <body><article><p>First paragraph.</p><p>Second one.</p></article></body></html>"#;
        let (content, url) = parse(html, "http://a.test/2024/rust");

        assert!(NewsExtractor.can_extract(&content, &url));
        let fields = NewsExtractor.extract(&content, &url).unwrap();
        assert_eq!(fields["headline"], "Rust 2.0 announced");
        assert_eq!(fields["authors"], json!(["Ada", "Grace"]));
        assert_eq!(fields["date_published"], "2024-03-01T10:30:00Z");
        assert_eq!(fields["date_published_formatted"], "2024-03-01 10:30:00");
        assert_eq!(fields["publisher"], "Daily Bit");
        assert_eq!(fields["main_image"], "http://a.test/lead.jpg");
        assert_eq!(fields["categories"], json!(["Tech"]));
        assert_eq!(fields["tags"], json!(["rust", "compilers"]));
        assert_eq!(fields["content"], "First paragraph.\n\nSecond one.");
        assert_eq!(fields["word_count"], 4);
    }

    #[test]
    fn test_html_article_with_byline() {
        let html = r#"<html><body>
            <h1>Local team wins</h1>
            <span class="byline">By Jane Roe and John Doe</span>
            <time datetime="2023-11-05">Nov 5</time>
            <div class="tags"><a>sports</a><a>local</a></div>
            <div class="article-body"><p>It was a close game.</p></div>
            </body></html>"#;
        let (content, url) = parse(html, "http://paper.test/sports/1");

        assert!(NewsExtractor.can_extract(&content, &url));
        let fields = NewsExtractor.extract(&content, &url).unwrap();
        assert_eq!(fields["headline"], "Local team wins");
        assert_eq!(fields["authors"], json!(["Jane Roe", "John Doe"]));
        assert_eq!(fields["date_published"], "2023-11-05");
        assert_eq!(fields["date_published_formatted"], "2023-11-05 00:00:00");
        assert_eq!(fields["tags"], json!(["sports", "local"]));
        assert_eq!(fields["content"], "It was a close game.");
    }

    #[test]
    fn test_detection_signals() {
        let (plain, url) = parse("<html><body><p>Short</p></body></html>", "http://a.test/about");
        assert!(!NewsExtractor.can_extract(&plain, &url));

        let news_url = Url::parse("http://a.test/news/today").unwrap();
        assert!(NewsExtractor.can_extract(&plain, &news_url));

        let long = format!("<html><body><article>{}</article></body></html>", "word ".repeat(150));
        let (long, url) = parse(&long, "http://a.test/x");
        assert!(NewsExtractor.can_extract(&long, &url));
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2024-01-02").as_deref(), Some("2024-01-02 00:00:00"));
        assert_eq!(format_date("March 3, 2024").as_deref(), Some("2024-03-03 00:00:00"));
        assert_eq!(
            format_date("Tue, 1 Jul 2003 10:52:37 +0200").as_deref(),
            Some("2003-07-01 10:52:37")
        );
        assert!(format_date("yesterday").is_none());
    }
}
