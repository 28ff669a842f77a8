use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use harvest_core::config::ExtractorSelection;
use harvest_core::error::{Error, Result};
use harvest_core::record::ExtractionRecord;
use log::{debug, warn};
use url::Url;

use crate::ecommerce::EcommerceExtractor;
use crate::extractor::Extractor;
use crate::generic::GenericExtractor;
use crate::news::NewsExtractor;
use crate::parsed::ParsedContent;
use crate::social::SocialExtractor;

/// Ordered set of extractors, consulted in registration order.
///
/// The registry knows nothing about concrete extractor types beyond the
/// built-in set offered by [`ExtractorRegistry::with_builtin`].
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
    fallback: Option<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry without a fallback
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
            fallback: None,
        }
    }

    /// Create a registry with the built-in extractors (ecommerce, news and
    /// social) and the generic extractor as fallback
    pub fn with_builtin() -> Self {
        let mut registry = Self::new().with_fallback(Some(Arc::new(GenericExtractor::new())));
        registry.register(EcommerceExtractor::new());
        registry.register(NewsExtractor::new());
        registry.register(SocialExtractor::new());
        registry
    }

    /// Add an extractor after the ones already registered.
    ///
    /// An extractor with the same name as an existing one replaces it in place.
    pub fn register<E: Extractor>(&mut self, extractor: E) -> &mut Self {
        self.register_shared(Arc::new(extractor))
    }

    /// Add a shared extractor
    pub fn register_shared(&mut self, extractor: Arc<dyn Extractor>) -> &mut Self {
        match self.extractors.iter().position(|e| e.name() == extractor.name()) {
            Some(index) => {
                warn!("Replacing extractor '{}'", extractor.name());
                self.extractors[index] = extractor;
            }
            None => self.extractors.push(extractor),
        }
        self
    }

    /// Replace the extractor used when nothing matches, or disable it
    pub fn with_fallback(mut self, fallback: Option<Arc<dyn Extractor>>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Look up an extractor by name, the fallback included
    pub fn get(&self, name: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors
            .iter()
            .chain(self.fallback.iter())
            .find(|e| e.name() == name)
            .cloned()
    }

    /// Names of the registered extractors in order
    pub fn names(&self) -> Vec<String> {
        self.extractors.iter().map(|e| e.name().to_string()).collect()
    }

    /// Number of registered extractors
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    /// Check if no extractor is registered
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Check that a selection can be honoured
    pub fn validate(&self, selection: &ExtractorSelection) -> Result<()> {
        match selection {
            ExtractorSelection::Named(name) if self.get(name).is_none() => Err(Error::config(format!(
                "unknown extractor '{}' (available: {})",
                name,
                self.names().join(", ")
            ))),
            _ => Ok(()),
        }
    }

    /// The first extractor, in registration order, that accepts the page
    pub fn select(&self, content: &ParsedContent, url: &Url) -> Option<Arc<dyn Extractor>> {
        self.extractors
            .iter()
            .find(|e| e.can_extract(content, url))
            .cloned()
    }

    /// Every extractor that accepts the page, in registration order
    pub fn select_all(&self, content: &ParsedContent, url: &Url) -> Vec<Arc<dyn Extractor>> {
        self.extractors
            .iter()
            .filter(|e| e.can_extract(content, url))
            .cloned()
            .collect()
    }

    /// Run the selected extractors over a page and wrap their output in
    /// records.
    ///
    /// A page always yields at least one record while a fallback is set. An
    /// extractor error or panic becomes a record with an error status instead
    /// of propagating.
    pub fn dispatch(
        &self,
        content: &ParsedContent,
        url: &Url,
        depth: usize,
        selection: &ExtractorSelection,
    ) -> Vec<ExtractionRecord> {
        let mut chosen: Vec<Arc<dyn Extractor>> = match selection {
            ExtractorSelection::Auto => self.select(content, url).into_iter().collect(),
            ExtractorSelection::All => self.select_all(content, url),
            ExtractorSelection::Named(name) => match self.get(name) {
                Some(extractor) => vec![extractor],
                None => {
                    return vec![ExtractionRecord::failed(
                        url.clone(),
                        name.as_str(),
                        depth,
                        format!("unknown extractor '{}'", name),
                    )]
                }
            },
        };

        if chosen.is_empty() {
            if let Some(fallback) = &self.fallback {
                debug!("No extractor matched {}, using '{}'", url, fallback.name());
                chosen.push(Arc::clone(fallback));
            }
        }

        chosen
            .iter()
            .map(|extractor| run_extractor(extractor.as_ref(), content, url, depth))
            .collect()
    }
}

fn run_extractor(
    extractor: &dyn Extractor,
    content: &ParsedContent,
    url: &Url,
    depth: usize,
) -> ExtractionRecord {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(content, url)));
    match outcome {
        Ok(Ok(fields)) => {
            debug!("Extractor '{}' produced {} fields for {}", extractor.name(), fields.len(), url);
            ExtractionRecord::new(url.clone(), extractor.name(), depth, fields, extractor.fields())
        }
        Ok(Err(e)) => {
            warn!("Extractor '{}' failed on {}: {}", extractor.name(), url, e);
            ExtractionRecord::failed(url.clone(), extractor.name(), depth, e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("Extractor '{}' panicked on {}: {}", extractor.name(), url, message);
            ExtractionRecord::failed(
                url.clone(),
                extractor.name(),
                depth,
                format!("extractor panicked: {}", message),
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
