use std::collections::BTreeMap;

use harvest_core::error::Result;
use harvest_core::record::FieldMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use url::Url;

use crate::extractor::{ld_image, ld_list, ld_name, ld_text, put, put_missing, Extractor};
use crate::parsed::{element_text, ParsedContent};

const FIELDS: &[&str] = &[
    "name",
    "price",
    "currency",
    "description",
    "brand",
    "sku",
    "availability",
    "images",
];

const PRODUCT_TYPES: &[&str] = &["Product", "IndividualProduct", "ProductModel"];

const PRODUCT_PATHS: &[&str] = &["/product/", "/products/", "/item/", "/p/"];

const PRICE_SELECTORS: &[&str] = &[
    ".price",
    r#"[itemprop="price"]"#,
    ".product-price",
    ".current-price",
    ".product__price",
    "[data-price]",
    "span.amount",
    ".sales-price",
    ".offer-price",
    ".product-meta__price",
    ".product-details__price",
    ".product-single__price",
];

const NAME_SELECTORS: &[&str] = &[
    "h1.product-title",
    ".product-name",
    r#"[itemprop="name"]"#,
    ".product__title",
    ".product-meta__title",
    ".product-single__title",
    ".product-details__title",
    "h1",
];

const DESCRIPTION_SELECTORS: &[&str] = &[
    ".product-description",
    r#"[itemprop="description"]"#,
    ".product-details__description",
    "#product-description",
    ".product__description",
    ".description",
];

const BRAND_SELECTORS: &[&str] = &[r#"[itemprop="brand"]"#, ".product-brand", ".brand"];

const AVAILABILITY_SELECTORS: &[&str] = &[
    r#"[itemprop="availability"]"#,
    ".availability",
    ".stock-status",
    ".product-availability",
];

const MAX_IMAGES: usize = 10;

static CART_BUTTON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)add to ?(cart|bag|basket)|buy (now|it)").expect("valid cart regex"));

static VARIANT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)variant|option|size|color").expect("valid variant regex"));

static NUMERIC_PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)*").expect("valid price regex"));

/// Product pages: name, price, brand, availability and the like.
///
/// JSON-LD `Product` data is preferred; HTML selectors fill whatever it
/// leaves out.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcommerceExtractor;

impl EcommerceExtractor {
    pub fn new() -> Self {
        Self
    }

    fn from_structured_data(&self, content: &ParsedContent, fields: &mut FieldMap) {
        let Some(product) = content.json_ld_of_type(PRODUCT_TYPES) else {
            return;
        };

        put(fields, "name", ld_text(product.get("name")));
        put(fields, "description", ld_text(product.get("description")));
        put(fields, "brand", ld_name(product.get("brand")));
        put(fields, "sku", ld_text(product.get("sku")));
        put(fields, "mpn", ld_text(product.get("mpn")));
        put(
            fields,
            "gtin",
            ["gtin13", "gtin14", "gtin"]
                .iter()
                .find_map(|key| ld_text(product.get(*key))),
        );

        if let Some(offer) = ld_list(product.get("offers")).first() {
            put(fields, "price", ld_text(offer.get("price")));
            put(fields, "currency", ld_text(offer.get("priceCurrency")));
            put(fields, "availability", ld_text(offer.get("availability")));
        }

        let images: Vec<Value> = ld_list(product.get("image"))
            .into_iter()
            .filter_map(ld_image)
            .take(MAX_IMAGES)
            .map(Value::from)
            .collect();
        put(fields, "images", images);

        if let Some(rating) = product.get("aggregateRating") {
            put(fields, "rating", ld_text(rating.get("ratingValue")));
            put(
                fields,
                "rating_count",
                ld_text(rating.get("reviewCount")).or_else(|| ld_text(rating.get("ratingCount"))),
            );
        }
    }

    fn from_html(&self, content: &ParsedContent, fields: &mut FieldMap) {
        put_missing(
            fields,
            "name",
            NAME_SELECTORS.iter().find_map(|css| content.select_text(css)),
        );

        if let Some((text, amount)) = self.price(content) {
            put_missing(fields, "price", amount);
            put_missing(fields, "currency", currency_for(&text));
            put_missing(fields, "price_text", text);
        }

        put_missing(
            fields,
            "description",
            DESCRIPTION_SELECTORS
                .iter()
                .find_map(|css| content.select_text(css))
                .or_else(|| content.meta("og:description")),
        );
        put_missing(
            fields,
            "brand",
            BRAND_SELECTORS.iter().find_map(|css| content.select_text(css)),
        );

        let availability = AVAILABILITY_SELECTORS.iter().find_map(|css| {
            content
                .select_attr(css, "content")
                .or_else(|| content.select_text(css))
        });
        if let Some(availability) = availability {
            let lower = availability.to_lowercase();
            let in_stock = ["in stock", "instock", "available", "shipping today"]
                .iter()
                .any(|s| lower.contains(s))
                && !lower.contains("unavailable");
            put_missing(fields, "in_stock", in_stock);
            put_missing(fields, "availability", availability);
        }

        put_missing(fields, "images", self.images(content));
    }

    /// Displayed price text and its numeric part
    fn price(&self, content: &ParsedContent) -> Option<(String, String)> {
        let element = PRICE_SELECTORS.iter().find_map(|css| content.select_first(css))?;
        let attr = element
            .value()
            .attr("data-price")
            .or_else(|| element.value().attr("content"))
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let text = element_text(&element);
        let text = if text.is_empty() { attr?.to_string() } else { text };

        let amount = match attr.filter(|v| v.parse::<f64>().is_ok()) {
            Some(raw) => raw.to_string(),
            None => NUMERIC_PRICE.find(&text)?.as_str().replace(',', "."),
        };
        Some((text, amount))
    }

    fn images(&self, content: &ParsedContent) -> Vec<Value> {
        let mut images = Vec::new();
        for img in content.select(
            r#"[itemprop="image"], .product-image img, .product__image img, .product-gallery img"#,
        ) {
            let value = img.value();
            let src = value
                .attr("data-src")
                .or_else(|| value.attr("src"))
                .or_else(|| value.attr("content"));
            if let Some(url) = src.and_then(|s| content.resolve(s)) {
                let url = url.to_string();
                if !images.iter().any(|i: &Value| i["url"] == url.as_str()) {
                    images.push(json!({ "url": url, "alt": value.attr("alt").unwrap_or_default() }));
                }
            }
            if images.len() >= MAX_IMAGES {
                break;
            }
        }
        images
    }

    fn variants(&self, content: &ParsedContent) -> Vec<Value> {
        content
            .select("select[name]")
            .iter()
            .filter(|select| {
                select
                    .value()
                    .attr("name")
                    .is_some_and(|name| VARIANT_NAME.is_match(name))
            })
            .filter_map(|select| {
                let name = select.value().attr("name").unwrap_or_default();
                let values: Vec<String> = content_options(select);
                (!values.is_empty()).then(|| json!({ "name": name, "values": values }))
            })
            .collect()
    }

    fn specifications(&self, content: &ParsedContent) -> BTreeMap<String, String> {
        let mut specs = BTreeMap::new();
        for row in content.select(".specifications tr, .product-specs tr, .specs-table tr, table.specs tr") {
            let cells: Vec<String> = row
                .children()
                .filter_map(scraper::ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "th" | "td"))
                .map(|cell| element_text(&cell))
                .collect();
            if let [label, value, ..] = cells.as_slice() {
                if !label.is_empty() && !value.is_empty() {
                    specs.insert(label.trim_end_matches(':').to_string(), value.clone());
                }
            }
        }
        specs
    }
}

fn content_options(select: &scraper::ElementRef<'_>) -> Vec<String> {
    let Ok(option) = scraper::Selector::parse("option") else {
        return Vec::new();
    };
    select
        .select(&option)
        .filter(|o| o.value().attr("value").is_some_and(|v| !v.trim().is_empty()))
        .map(|o| element_text(&o))
        .filter(|text| !text.is_empty())
        .collect()
}

fn currency_for(price_text: &str) -> Option<&'static str> {
    [("$", "USD"), ("£", "GBP"), ("€", "EUR"), ("¥", "JPY")]
        .iter()
        .find(|(symbol, _)| price_text.contains(symbol))
        .map(|(_, code)| *code)
}

impl Extractor for EcommerceExtractor {
    fn name(&self) -> &str {
        "ecommerce"
    }

    fn fields(&self) -> &[&'static str] {
        FIELDS
    }

    fn can_extract(&self, content: &ParsedContent, url: &Url) -> bool {
        if content.json_ld_of_type(PRODUCT_TYPES).is_some() {
            return true;
        }

        let path = url.path().to_lowercase();
        if PRODUCT_PATHS.iter().any(|p| path.contains(p)) {
            return true;
        }

        if PRICE_SELECTORS.iter().any(|css| content.exists(css)) {
            return true;
        }

        if content
            .select("button, a")
            .iter()
            .any(|el| CART_BUTTON.is_match(&element_text(el)))
        {
            return true;
        }

        content
            .select("select[name], input[name]")
            .iter()
            .any(|el| el.value().attr("name").is_some_and(|n| VARIANT_NAME.is_match(n)))
    }

    fn extract(&self, content: &ParsedContent, _url: &Url) -> Result<FieldMap> {
        let mut fields = FieldMap::new();
        self.from_structured_data(content, &mut fields);
        self.from_html(content, &mut fields);

        put(&mut fields, "variants", self.variants(content));
        let specs: serde_json::Map<String, Value> = self
            .specifications(content)
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();
        put(&mut fields, "specifications", specs);

        Ok(fields)
    }
}
