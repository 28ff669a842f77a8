use harvest_core::config::ExtractorSelection;
use harvest_core::error::{Error, Result};
use harvest_core::record::{FieldMap, RecordStatus, UNKNOWN};
use harvest_extractors::{Extractor, ExtractorRegistry, ParsedContent};
use url::Url;

const PRODUCT_AND_ARTICLE: &str = r#"<html><head>
    <title>Review: the Widget</title>
    <script type="application/ld+json">{"@type": "Product", "name": "Widget"}</script>
    <script type="application/ld+json">{"@type": "Article", "headline": "Widget review"}</script>
    </head><body><h1>Widget review</h1></body></html>"#;

const PLAIN: &str = "<html><head><title>Plain</title></head><body><p>Nothing special</p></body></html>";

/// Accepts everything and always fails
struct Broken;

impl Extractor for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn fields(&self) -> &[&'static str] {
        &[]
    }

    fn can_extract(&self, _content: &ParsedContent, _url: &Url) -> bool {
        true
    }

    fn extract(&self, _content: &ParsedContent, url: &Url) -> Result<FieldMap> {
        Err(Error::extraction("broken", url.as_str(), "selector exploded"))
    }
}

/// Accepts everything and panics
struct Panicking;

impl Extractor for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn fields(&self) -> &[&'static str] {
        &[]
    }

    fn can_extract(&self, _content: &ParsedContent, _url: &Url) -> bool {
        true
    }

    fn extract(&self, _content: &ParsedContent, url: &Url) -> Result<FieldMap> {
        panic!("cannot handle {}", url.path())
    }
}

/// Matches pages whose title mentions a word
struct TitleContains(&'static str, &'static str);

impl Extractor for TitleContains {
    fn name(&self) -> &str {
        self.0
    }

    fn fields(&self) -> &[&'static str] {
        &["title", "missing"]
    }

    fn can_extract(&self, content: &ParsedContent, _url: &Url) -> bool {
        content.title().is_some_and(|t| t.contains(self.1))
    }

    fn extract(&self, content: &ParsedContent, _url: &Url) -> Result<FieldMap> {
        let mut fields = FieldMap::new();
        fields.insert("title".into(), content.title().into());
        Ok(fields)
    }
}

fn page(html: &str, url: &str) -> (ParsedContent, Url) {
    let url = Url::parse(url).unwrap();
    (ParsedContent::parse(html, url.clone()), url)
}

#[test]
fn test_builtin_order() {
    let registry = ExtractorRegistry::with_builtin();
    assert_eq!(registry.names(), vec!["ecommerce", "news", "social"]);
    assert!(registry.get("generic").is_some());
}

#[test]
fn test_auto_selection_is_first_match_and_deterministic() {
    let registry = ExtractorRegistry::with_builtin();
    let (content, url) = page(PRODUCT_AND_ARTICLE, "http://a.test/review");

    for _ in 0..5 {
        let selected = registry.select(&content, &url).unwrap();
        assert_eq!(selected.name(), "ecommerce");
    }

    let records = registry.dispatch(&content, &url, 2, &ExtractorSelection::Auto);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].extractor_name, "ecommerce");
    assert_eq!(records[0].depth, 2);
    assert_eq!(records[0].get("name").unwrap(), "Widget");
}

#[test]
fn test_extract_all_yields_one_record_per_match() {
    let registry = ExtractorRegistry::with_builtin();
    let (content, url) = page(PRODUCT_AND_ARTICLE, "http://a.test/review");

    let records = registry.dispatch(&content, &url, 0, &ExtractorSelection::All);
    let names: Vec<_> = records.iter().map(|r| r.extractor_name.as_str()).collect();
    assert_eq!(names, vec!["ecommerce", "news"]);
}

#[test]
fn test_no_match_falls_back_to_generic() {
    let registry = ExtractorRegistry::with_builtin();
    let (content, url) = page(PLAIN, "http://a.test/plain");

    assert!(registry.select(&content, &url).is_none());
    let records = registry.dispatch(&content, &url, 0, &ExtractorSelection::Auto);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].extractor_name, "generic");
    assert_eq!(records[0].get("title").unwrap(), "Plain");
    assert!(records[0].is_unknown("description"));
}

#[test]
fn test_without_fallback_unmatched_page_has_no_records() {
    let registry = ExtractorRegistry::with_builtin().with_fallback(None);
    let (content, url) = page(PLAIN, "http://a.test/plain");
    assert!(registry.dispatch(&content, &url, 0, &ExtractorSelection::Auto).is_empty());
}

#[test]
fn test_named_extractor_skips_can_extract() {
    let registry = ExtractorRegistry::with_builtin();
    let (content, url) = page(PLAIN, "http://a.test/plain");

    let records = registry.dispatch(&content, &url, 0, &ExtractorSelection::Named("ecommerce".into()));
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.extractor_name, "ecommerce");
    assert!(record.is_ok());
    for field in ["price", "currency", "brand", "sku", "availability", "images"] {
        assert!(record.is_unknown(field), "{} should be unknown", field);
    }
}

#[test]
fn test_unknown_named_extractor() {
    let registry = ExtractorRegistry::with_builtin();
    assert!(registry.validate(&ExtractorSelection::Named("nope".into())).is_err());
    assert!(registry.validate(&ExtractorSelection::Named("news".into())).is_ok());
    assert!(registry.validate(&ExtractorSelection::All).is_ok());

    let (content, url) = page(PLAIN, "http://a.test/plain");
    let records = registry.dispatch(&content, &url, 0, &ExtractorSelection::Named("nope".into()));
    assert_eq!(records[0].status, RecordStatus::Error);
}

#[test]
fn test_extractor_error_becomes_error_record() {
    let mut registry = ExtractorRegistry::new();
    registry.register(Broken);
    let (content, url) = page(PLAIN, "http://a.test/plain");

    let records = registry.dispatch(&content, &url, 1, &ExtractorSelection::Auto);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Error);
    assert!(records[0].error.as_deref().unwrap().contains("selector exploded"));
    assert!(records[0].fields.is_empty());
}

#[test]
fn test_custom_extractors_in_registration_order() {
    let mut registry = ExtractorRegistry::new();
    registry
        .register(TitleContains("first", "Plain"))
        .register(TitleContains("second", "Plain"));
    let (content, url) = page(PLAIN, "http://a.test/plain");

    let records = registry.dispatch(&content, &url, 0, &ExtractorSelection::Auto);
    assert_eq!(records[0].extractor_name, "first");
    assert_eq!(records[0].get("missing").unwrap(), UNKNOWN);

    // Re-registering a name replaces it in place
    registry.register(TitleContains("first", "Other"));
    assert_eq!(registry.names(), vec!["first", "second"]);
    assert_eq!(registry.select(&content, &url).unwrap().name(), "second");
}

#[test]
fn test_extractor_panic_becomes_error_record() {
    let mut registry = ExtractorRegistry::new();
    registry.register(Panicking).register(TitleContains("plain", "Plain"));
    let (content, url) = page(PLAIN, "http://a.test/bad");

    let records = registry.dispatch(&content, &url, 2, &ExtractorSelection::All);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].extractor_name, "panicking");
    assert_eq!(records[0].status, RecordStatus::Error);
    assert_eq!(records[0].depth, 2);
    assert!(records[0].error.as_deref().unwrap().contains("cannot handle /bad"));
    // Later extractors still run
    assert!(records[1].is_ok());
}

#[test]
fn test_new_registry_has_no_fallback() {
    let registry = ExtractorRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.get("generic").is_none());

    let (content, url) = page(PLAIN, "http://a.test/plain");
    assert!(registry.dispatch(&content, &url, 0, &ExtractorSelection::Auto).is_empty());

    assert!(ExtractorRegistry::with_builtin().get("generic").is_some());
}
