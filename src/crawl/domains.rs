// src/crawl/domains.rs
// =============================================================================
// External domain checks.
//
// The crawler never follows links off the site, but it does look at where
// they point. The first time a job sees a link to another domain, that
// domain gets two quick checks:
//
// - DNS: does the name resolve at all? ("ACTIVE", or why not)
// - HTTP: what does http://<domain>/ answer? (the status code, or the error)
//
// and one log line:
//
//   Domain checked: docs.rs - HTTP: 200, DNS: ACTIVE
//
// The HTTP request goes through the politeness gate like every other one.
// =============================================================================

use std::fmt;
use std::time::Duration;
use tokio::net::lookup_host;
use url::{Host, Url};

use super::fetch::Fetcher;
use super::gate::PolitenessGate;
use crate::error::CrawlError;

// What a domain check found
#[derive(Debug)]
pub struct DomainCheck {
    pub domain: String,
    pub http: Result<u16, CrawlError>,
    /// Number of addresses the name resolved to, or why it didn't
    pub dns: Result<usize, String>,
}

impl DomainCheck {
    // Resolves and answers with something other than a 4xx/5xx
    pub fn is_healthy(&self) -> bool {
        self.dns.is_ok() && matches!(self.http, Ok(status) if status < 400)
    }
}

impl fmt::Display for DomainCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Domain checked: {} - HTTP: ", self.domain)?;
        match &self.http {
            Ok(status) => write!(f, "{}", status)?,
            Err(e) => write!(f, "{}", e)?,
        }
        match &self.dns {
            Ok(_) => write!(f, ", DNS: ACTIVE"),
            Err(reason) => write!(f, ", DNS: {}", reason),
        }
    }
}

// The key a job remembers checked domains by: lowercase host, plus the port
// when the link names one. None for URLs without a host.
pub fn domain_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

// Runs both checks for the domain of `link`. Never fails: every problem
// ends up in the returned DomainCheck.
pub async fn check_domain(
    fetcher: &Fetcher,
    gate: &PolitenessGate,
    link: &Url,
    timeout: Duration,
) -> DomainCheck {
    let domain = domain_key(link).unwrap_or_default();

    let dns = resolve(link, timeout).await;

    let http = match Url::parse(&format!("http://{}/", domain)) {
        Ok(root) => {
            if let Some(host) = root.host_str() {
                gate.acquire(host).await;
            }
            fetcher.status_of(&root).await
        }
        Err(e) => Err(CrawlError::invalid_url(domain.as_str(), e.to_string())),
    };

    DomainCheck { domain, http, dns }
}

// IP literals count as resolved without asking anyone
async fn resolve(link: &Url, timeout: Duration) -> Result<usize, String> {
    let name = match link.host() {
        Some(Host::Domain(name)) => name.to_string(),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => return Ok(1),
        None => return Err("no host".to_string()),
    };
    let port = link.port_or_known_default().unwrap_or(80);

    let result = match tokio::time::timeout(timeout, lookup_host((name.as_str(), port))).await {
        Ok(Ok(addrs)) => match addrs.count() {
            0 => Err("NO RECORDS".to_string()),
            n => Ok(n),
        },
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("lookup timed out after {}ms", timeout.as_millis())),
    };
    result
}
