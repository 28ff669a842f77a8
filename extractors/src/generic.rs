use harvest_core::error::Result;
use harvest_core::record::FieldMap;
use serde_json::{json, Value};
use url::Url;

use crate::extractor::{put, Extractor};
use crate::parsed::ParsedContent;

const FIELDS: &[&str] = &[
    "title",
    "description",
    "keywords",
    "canonical_url",
    "headings",
    "text_length",
    "page_size_bytes",
];

/// Basic page metadata, used when no specialised extractor matches
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericExtractor;

impl GenericExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for GenericExtractor {
    fn name(&self) -> &str {
        "generic"
    }

    fn fields(&self) -> &[&'static str] {
        FIELDS
    }

    fn can_extract(&self, _content: &ParsedContent, _url: &Url) -> bool {
        true
    }

    fn extract(&self, content: &ParsedContent, _url: &Url) -> Result<FieldMap> {
        let mut fields = FieldMap::new();

        put(
            &mut fields,
            "title",
            content.title().or_else(|| content.meta("og:title")),
        );
        put(
            &mut fields,
            "description",
            content
                .meta("description")
                .or_else(|| content.meta("og:description")),
        );

        let keywords: Vec<Value> = content
            .meta("keywords")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(Value::from)
            .collect();
        put(&mut fields, "keywords", keywords);

        put(
            &mut fields,
            "canonical_url",
            content
                .select_attr(r#"link[rel="canonical"]"#, "href")
                .and_then(|href| content.resolve(&href))
                .map(|url| url.to_string()),
        );

        let headings: Vec<Value> = content
            .headings()
            .into_iter()
            .map(|(level, text)| json!({ "level": level, "text": text }))
            .collect();
        put(&mut fields, "headings", headings);

        fields.insert("text_length".into(), content.text_content().chars().count().into());
        fields.insert("page_size_bytes".into(), content.size().into());

        Ok(fields)
    }
}
