use std::collections::{HashSet, VecDeque};

use harvest_core::entry::UrlEntry;
use harvest_core::error::{Error, Result};
use log::{debug, trace};

use crate::filter::UrlFilter;

/// Which end of the queue `pop` takes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PopOrder {
    Fifo,
    Lifo,
}

/// Queue, visited set and yielded set, always locked together
#[derive(Debug)]
pub(crate) struct FrontierState {
    queue: VecDeque<UrlEntry>,
    visited: HashSet<String>,
    yielded: HashSet<String>,
    max_depth: usize,
    filter: UrlFilter,
}

impl FrontierState {
    pub(crate) fn new(max_depth: usize, filter: UrlFilter) -> Self {
        Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            yielded: HashSet::new(),
            max_depth,
            filter,
        }
    }

    pub(crate) fn push(&mut self, entry: UrlEntry) -> bool {
        if entry.depth > self.max_depth {
            trace!(
                "Dropping {} at depth {} (max {})",
                entry.url,
                entry.depth,
                self.max_depth
            );
            return false;
        }

        // Seeds are always crawled; only discovered links go through the filter
        if entry.discovered_from.is_some() && !self.filter.allows(&entry.url) {
            return false;
        }

        if !self.visited.insert(entry.key().to_string()) {
            return false;
        }

        debug!("Enqueued {} at depth {}", entry.url, entry.depth);
        self.queue.push_back(entry);
        true
    }

    pub(crate) fn pop(&mut self, order: PopOrder) -> Result<Option<UrlEntry>> {
        let entry = match order {
            PopOrder::Fifo => self.queue.pop_front(),
            PopOrder::Lifo => self.queue.pop_back(),
        };

        let Some(entry) = entry else {
            return Ok(None);
        };

        if !self.yielded.insert(entry.key().to_string()) {
            return Err(Error::FrontierCorruption(format!(
                "{} would be yielded a second time",
                entry.url
            )));
        }

        Ok(Some(entry))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn has_seen(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.visited.clear();
        self.yielded.clear();
    }

    /// Put an already yielded entry back, bypassing every check.
    #[cfg(test)]
    pub(crate) fn force_requeue(&mut self, entry: UrlEntry) {
        self.queue.push_back(entry);
    }
}
