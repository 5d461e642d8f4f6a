//! Pattern knowledge base
//!
//! Remembers which card signature worked on which domain and predicts one
//! for domains it has never crawled, by weighting what worked on
//! similar-looking hostnames.
//!
//! The knowledge base is a service over an injected [`PatternStore`]: it
//! keeps every record in an in-memory cache for lookups and writes through to
//! the store on each success.

mod similarity;

pub use similarity::{domain_similarity, trigrams};

pub use crate::storage::{DomainPatternRecord, PatternHistoryEntry};

use crate::config::KnowledgeConfig;
use crate::storage::{PatternStore, StorageError, StorageResult};
use crate::url::domain_key;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

/// Shared handle to the store the knowledge base writes through to
pub type SharedPatternStore = Arc<Mutex<dyn PatternStore + Send>>;

/// Summary of what has been learned so far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeStats {
    /// Domains with a recorded pattern
    pub patterns: usize,
    /// Sum of success counts across domains
    pub total_scrapes: u64,
    /// Sum of listings extracted across domains
    pub total_listings: u64,
    /// Learned domains, sorted
    pub domains: Vec<String>,
}

/// Per-domain pattern memory with similarity-based prediction
pub struct KnowledgeBase {
    store: SharedPatternStore,
    cache: RwLock<HashMap<String, DomainPatternRecord>>,
    config: KnowledgeConfig,
}

impl KnowledgeBase {
    /// Creates a knowledge base with an empty cache
    pub fn new(store: SharedPatternStore, config: KnowledgeConfig) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Creates a knowledge base primed with every record in the store
    pub fn load(store: SharedPatternStore, config: KnowledgeConfig) -> StorageResult<Self> {
        let records = store
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .load_patterns()?;

        tracing::info!("Loaded {} learned pattern(s)", records.len());

        let cache = records
            .into_iter()
            .map(|record| (record.domain.clone(), record))
            .collect();

        Ok(Self {
            store,
            cache: RwLock::new(cache),
            config,
        })
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, DomainPatternRecord>> {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records that `signature` extracted `listings` listings from the domain of `source_url`
    ///
    /// The in-memory record is updated first, so the current run benefits
    /// even when the write to the store fails. The caller decides what to do
    /// with a store error; the crawler logs it and carries on.
    pub fn record_success(
        &self,
        source_url: &str,
        signature: &str,
        listings: u32,
    ) -> StorageResult<()> {
        let Some(domain) = domain_key(source_url) else {
            tracing::debug!("Not recording pattern for URL without host: {}", source_url);
            return Ok(());
        };

        let now = Utc::now();
        let record = {
            let mut cache = self.cache.write().map_err(|_| StorageError::LockPoisoned)?;
            let entry = cache
                .entry(domain.clone())
                .or_insert_with(|| DomainPatternRecord {
                    domain: domain.clone(),
                    pattern_signature: signature.to_string(),
                    success_count: 0,
                    total_listings: 0,
                    first_seen: now,
                    last_used: now,
                });
            entry.pattern_signature = signature.to_string();
            entry.success_count += 1;
            entry.total_listings += u64::from(listings);
            entry.last_used = now;
            entry.clone()
        };

        tracing::info!(
            "Learned pattern for {} ({} successes, {} listings total)",
            domain,
            record.success_count,
            record.total_listings
        );

        let mut store = self.store.lock().map_err(|_| StorageError::LockPoisoned)?;
        store.upsert_pattern(&record)?;
        store.append_history(&PatternHistoryEntry {
            domain,
            pattern_signature: signature.to_string(),
            listings_count: listings,
            recorded_at: now,
        })?;

        Ok(())
    }

    /// Exact lookup of a domain's record
    pub fn get_pattern(&self, domain: &str) -> Option<DomainPatternRecord> {
        self.read_cache().get(domain).cloned()
    }

    /// Known domains more similar to `domain` than the configured floor
    ///
    /// Sorted by similarity (highest first, ties by domain name), capped at
    /// `max_similar_domains`. The domain itself is never included.
    pub fn similar_domains(&self, domain: &str) -> Vec<(String, f64)> {
        let cache = self.read_cache();
        let mut similar: Vec<(String, f64)> = cache
            .keys()
            .filter(|known| known.as_str() != domain)
            .map(|known| (known.clone(), domain_similarity(domain, known)))
            .filter(|(_, similarity)| *similarity > self.config.similarity_floor)
            .collect();

        similar.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        similar.truncate(self.config.max_similar_domains);
        similar
    }

    /// Predicts which of the page's available signatures will work
    ///
    /// A domain's own record wins when its signature is available. Otherwise
    /// each of the most similar known domains votes for its signature with
    /// weight `similarity × success_count`; only available signatures count.
    /// Ties go to the lexicographically smallest signature.
    ///
    /// # Arguments
    ///
    /// * `domain` - Domain key of the page being crawled
    /// * `available` - Signatures detected on the page
    ///
    /// # Returns
    ///
    /// The best-scoring available signature, or `None`
    pub fn predict_pattern(&self, domain: &str, available: &[String]) -> Option<String> {
        if let Some(record) = self.get_pattern(domain) {
            if available.contains(&record.pattern_signature) {
                return Some(record.pattern_signature);
            }
        }

        let similar = self.similar_domains(domain);
        let cache = self.read_cache();

        let mut scores: HashMap<&str, f64> = HashMap::new();
        for (known, similarity) in &similar {
            if let Some(record) = cache.get(known) {
                if available.contains(&record.pattern_signature) {
                    *scores.entry(record.pattern_signature.as_str()).or_insert(0.0) +=
                        similarity * f64::from(record.success_count);
                }
            }
        }

        let best = scores
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(signature, _)| signature.to_string());

        if let (Some(signature), Some((closest, _))) = (&best, similar.first()) {
            tracing::debug!(
                "Predicted pattern for {} from similar domain {}: {}",
                domain,
                closest,
                signature
            );
        }

        best
    }

    /// Totals over every learned domain
    pub fn stats(&self) -> KnowledgeStats {
        let cache = self.read_cache();
        let mut domains: Vec<String> = cache.keys().cloned().collect();
        domains.sort();

        KnowledgeStats {
            patterns: cache.len(),
            total_scrapes: cache.values().map(|r| u64::from(r.success_count)).sum(),
            total_listings: cache.values().map(|r| r.total_listings).sum(),
            domains,
        }
    }
}
