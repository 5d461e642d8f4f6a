use serde::Deserialize;

/// Main configuration structure for broker-sieve
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub vertical: VerticalFilter,
    #[serde(default, rename = "source")]
    pub sources: Vec<Source>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Hard cap on pages fetched per source
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Number of simple (non-rendered) sources crawled concurrently
    pub workers: u32,

    /// Consecutive pages without new listings before a source is stopped
    #[serde(rename = "consecutive-empty-limit")]
    pub consecutive_empty_limit: u32,

    /// Number of detected patterns tried per page before giving up
    #[serde(rename = "candidate-patterns")]
    pub candidate_patterns: usize,

    /// Lower bound of the jittered delay between pages of one source (milliseconds)
    #[serde(rename = "page-delay-min-ms")]
    pub page_delay_min_ms: u64,

    /// Upper bound of the jittered delay between pages of one source (milliseconds)
    #[serde(rename = "page-delay-max-ms")]
    pub page_delay_max_ms: u64,

    /// Lower bound of the delay between render-requiring sources (milliseconds)
    #[serde(rename = "politeness-min-ms")]
    pub politeness_min_ms: u64,

    /// Upper bound of the delay between render-requiring sources (milliseconds)
    #[serde(rename = "politeness-max-ms")]
    pub politeness_max_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 100,
            workers: 8,
            consecutive_empty_limit: 3,
            candidate_patterns: 3,
            page_delay_min_ms: 1000,
            page_delay_max_ms: 2000,
            politeness_min_ms: 1000,
            politeness_max_ms: 4000,
        }
    }
}

/// Thresholds used by the pattern detector
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Shallowest nesting depth considered (shallower nodes are layout chrome)
    #[serde(rename = "min-depth")]
    pub min_depth: usize,

    /// Deepest nesting depth considered (deeper nodes are leaf text)
    #[serde(rename = "max-depth")]
    pub max_depth: usize,

    /// Minimum number of elements sharing a signature
    #[serde(rename = "min-group-size")]
    pub min_group_size: usize,

    /// Minimum number of members with a link and card-sized text
    #[serde(rename = "min-valid-members")]
    pub min_valid_members: usize,

    /// Text length a member must exceed to count as a card
    #[serde(rename = "min-card-text")]
    pub min_card_text: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_depth: 3,
            max_depth: 15,
            min_group_size: 3,
            min_valid_members: 3,
            min_card_text: 50,
        }
    }
}

/// Pattern knowledge base tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Domains must be strictly more similar than this to influence a prediction
    #[serde(rename = "similarity-floor")]
    pub similarity_floor: f64,

    /// Number of most-similar known domains that vote on a prediction
    #[serde(rename = "max-similar-domains")]
    pub max_similar_domains: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            similarity_floor: 0.3,
            max_similar_domains: 5,
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Connection timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Attempts per fetch, including the first one
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Base delay of the exponential backoff (milliseconds)
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// Upper bound of a single backoff delay (milliseconds)
    #[serde(rename = "backoff-cap-ms")]
    pub backoff_cap_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("broker-sieve/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_attempts: 5,
            backoff_base_ms: 800,
            backoff_cap_ms: 12_000,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown run report
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}

/// Include/exclude keyword filter for the business vertical being collected
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VerticalFilter {
    /// Short identifier stored with each listing (e.g. "cleaning")
    pub slug: String,

    /// Human readable name used in logs and reports
    pub name: String,

    /// A listing must mention at least one of these (empty accepts all)
    pub include: Vec<String>,

    /// A listing mentioning any of these is rejected
    pub exclude: Vec<String>,
}

/// A seed page to crawl
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Source {
    /// Caller-assigned identifier (broker account number)
    pub id: String,

    /// Display name of the broker
    pub name: String,

    /// Listings page to start from
    pub url: String,

    /// Whether the page needs browser rendering rather than a plain fetch
    #[serde(default)]
    pub render: bool,
}

impl Source {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            render: false,
        }
    }
}
