//! Page parsing and the pluggable extractors that turn pages into records.

mod ecommerce;
mod extractor;
mod generic;
mod news;
mod parsed;
mod registry;
mod social;

pub use ecommerce::EcommerceExtractor;
pub use extractor::Extractor;
pub use generic::GenericExtractor;
pub use news::NewsExtractor;
pub use parsed::{clean_text, element_text, json_ld_types, ContentParser, HtmlParser, ParsedContent};
pub use registry::ExtractorRegistry;
pub use social::SocialExtractor;
