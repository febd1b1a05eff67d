// src/crawl/robots.rs
// =============================================================================
// robots.txt support: which paths we may fetch, and how slowly.
//
// Rules are looked up per origin (scheme + host + port) and cached for an
// hour. The first worker that needs an origin's rules fetches robots.txt
// (through the politeness gate, like any other request); workers asking for
// the same origin meanwhile wait for that one fetch instead of starting
// their own.
//
// Anything that goes wrong while fetching (404, timeout, refused
// connection, ...) means "no rules": everything is allowed.
//
// Matching follows the usual conventions:
// - The group naming our user agent wins over the "*" group
// - Patterns match the path plus query; `*` matches any run of characters
//   and a trailing `$` anchors the end
// - The longest matching pattern decides; on a tie Allow wins
// =============================================================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::debug;
use url::{Position, Url};

use super::fetch::Fetcher;
use super::gate::PolitenessGate;

const CACHE_TTL: Duration = Duration::from_secs(3600);

// Crawl-delay values above this are treated as this
const MAX_CRAWL_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsRules {
    allow: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<Duration>,
}

// The rules of one user-agent group while parsing
#[derive(Debug, Default)]
struct Group {
    rules: RobotsRules,
    seen: bool,
}

impl RobotsRules {
    // Parses robots.txt content for `user_agent`.
    //
    // A group applies to us when one of its User-agent tokens appears in our
    // user agent string (case-insensitive). Example: "DomainCrawler" matches
    // "Mozilla/5.0 (compatible; DomainCrawler/1.0)".
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let user_agent = user_agent.to_ascii_lowercase();

        let mut ours = Group::default();
        let mut anyone = Group::default();

        let mut agents: Vec<String> = Vec::new();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            if field == "user-agent" {
                // A User-agent line after rules starts a new group
                if in_rules {
                    agents.clear();
                    in_rules = false;
                }
                agents.push(value.to_ascii_lowercase());
                continue;
            }

            if !matches!(field.as_str(), "allow" | "disallow" | "crawl-delay") {
                continue;
            }
            in_rules = true;

            let for_us = agents.iter().any(|agent| {
                agent != "*" && !agent.is_empty() && user_agent.contains(agent.as_str())
            });
            let for_anyone = agents.iter().any(|agent| agent == "*");
            let group = if for_us {
                &mut ours
            } else if for_anyone {
                &mut anyone
            } else {
                continue;
            };
            group.seen = true;

            match field.as_str() {
                // An empty Disallow allows everything
                "disallow" if !value.is_empty() => group.rules.disallow.push(value.to_string()),
                "allow" if !value.is_empty() => group.rules.allow.push(value.to_string()),
                "crawl-delay" => {
                    if let Some(delay) = value
                        .parse::<f64>()
                        .ok()
                        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                    {
                        group.rules.crawl_delay = Some(delay.min(MAX_CRAWL_DELAY));
                    }
                }
                _ => {}
            }
        }

        if ours.seen {
            ours.rules
        } else {
            anyone.rules
        }
    }

    pub fn allows(&self, url: &Url) -> bool {
        let target = &url[Position::BeforePath..Position::AfterQuery];

        let longest = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|pattern| pattern_matches(pattern, target))
                .map(String::len)
                .max()
        };

        match (longest(self.disallow.as_slice()), longest(self.allow.as_slice())) {
            (None, _) => true,
            (Some(disallow), Some(allow)) => allow >= disallow,
            (Some(_), None) => false,
        }
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }
}

// robots.txt patterns are prefixes with two specials: `*` and a final `$`
fn pattern_matches(pattern: &str, target: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };
    glob(pattern.as_bytes(), target.as_bytes(), anchored)
}

fn glob(pattern: &[u8], target: &[u8], anchored: bool) -> bool {
    match pattern.split_first() {
        None => !anchored || target.is_empty(),
        Some((&b'*', rest)) => (0..=target.len()).any(|skip| glob(rest, &target[skip..], anchored)),
        Some((byte, rest)) => target.first() == Some(byte) && glob(rest, &target[1..], anchored),
    }
}

#[derive(Debug)]
struct Cached {
    rules: Arc<RobotsRules>,
    fetched_at: Instant,
}

// Per-origin cache of parsed robots.txt files
pub struct RobotsCache {
    fetcher: Fetcher,
    gate: Arc<PolitenessGate>,
    user_agent: String,
    entries: Mutex<HashMap<String, Arc<OnceCell<Cached>>>>,
}

impl RobotsCache {
    pub fn new(fetcher: Fetcher, gate: Arc<PolitenessGate>, user_agent: &str) -> Self {
        Self {
            fetcher,
            gate,
            user_agent: user_agent.to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    // The rules that apply to `url`, fetching robots.txt if needed
    pub async fn rules_for(&self, url: &Url) -> Arc<RobotsRules> {
        let cell = self.cell(&url.origin().ascii_serialization());
        let cached = cell.get_or_init(|| self.load(url)).await;
        Arc::clone(&cached.rules)
    }

    // How many origins have an entry (fetched or being fetched)
    pub fn origins_cached(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn cell(&self, origin: &str) -> Arc<OnceCell<Cached>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let expired = entries
            .get(origin)
            .and_then(|cell| cell.get())
            .is_some_and(|cached| cached.fetched_at.elapsed() >= CACHE_TTL);
        if expired {
            entries.remove(origin);
        }

        Arc::clone(entries.entry(origin.to_string()).or_default())
    }

    async fn load(&self, url: &Url) -> Cached {
        let mut robots_url = url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        if let Some(host) = robots_url.host_str() {
            self.gate.acquire(host).await;
        }

        let rules = match self.fetcher.fetch_text(&robots_url).await {
            Ok(content) => {
                debug!(url = %robots_url, "Loaded robots.txt");
                RobotsRules::parse(&content, &self.user_agent)
            }
            Err(e) => {
                debug!(
                    url = %robots_url,
                    error = %e,
                    "No usable robots.txt, allowing everything"
                );
                RobotsRules::default()
            }
        };

        Cached {
            rules: Arc::new(rules),
            fetched_at: Instant::now(),
        }
    }
}
