// src/crawl/links.rs
// =============================================================================
// Pulls follow-able links out of a fetched HTML page.
//
// We use the `scraper` crate which:
// - Parses HTML into a DOM (Document Object Model)
// - Supports CSS selectors for finding elements
// - Is built on html5ever (Mozilla's HTML parser)
//
// Only <a href> targets are considered, and only http(s) ones. Links to the
// page's own site are followed; links to other hosts are handed to the
// domain checks instead: the crawler stays on the site it was pointed at.
// =============================================================================

use scraper::{Html, Selector};
use url::Url;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PageLinks {
    /// Same host and port as the page, to be crawled
    pub same_site: Vec<Url>,
    /// Everything else, to be checked but never crawled
    pub external: Vec<Url>,
}

// Extracts the links from `html`, split by site.
//
// Parameters:
//   html: the page body
//   page_url: where the page was fetched from (for relative links)
//
// Returns absolute URLs, in document order, possibly with duplicates
// (the queue's seen-set and the job's domain set take care of those).
//
// Example:
//   html = "<a href='/docs'>Docs</a><a href='https://other.com'>x</a>"
//   page_url = "https://example.com/"
//   same_site = ["https://example.com/docs"]
//   external = ["https://other.com/"]
pub fn extract_links(html: &str, page_url: &Url) -> PageLinks {
    let document = Html::parse_document(html);

    let Ok(selector) = Selector::parse("a[href]") else {
        return PageLinks::default();
    };

    let (same_site, external): (Vec<Url>, Vec<Url>) = document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(page_url, href))
        .partition(|link| same_site(page_url, link));

    PageLinks {
        same_site,
        external,
    }
}

// Resolves a link (possibly relative) to an absolute http(s) URL
fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();

    // Skip in-page anchors and non-navigational schemes
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
        || href.starts_with("data:")
    {
        return None;
    }

    let url = base.join(href).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

// Two URLs are on the same site when host and explicit port match.
// The scheme may differ (an http page linking to its https twin); Url::port()
// is None for default ports, so :80 and :443 compare equal.
pub fn same_site(a: &Url, b: &Url) -> bool {
    let host_a = a.host_str().map(str::to_ascii_lowercase);
    let host_b = b.host_str().map(str::to_ascii_lowercase);
    host_a.is_some()
        && host_a == host_b
        && a.port() == b.port()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://example.com/page/").unwrap()
    }

    fn strings(links: Vec<Url>) -> Vec<String> {
        links.into_iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn test_resolve_relative_link() {
        let html = r#"<a href="/docs">Docs</a>"#;
        let links = extract_links(html, &page());
        assert_eq!(strings(links.same_site), vec!["https://example.com/docs"]);
        assert!(links.external.is_empty());
    }

    #[test]
    fn test_other_hosts_are_external() {
        let html = r#"
            <a href="https://www.rust-lang.org">Rust</a>
            <a href="/local">Local</a>
            <a href="https://example.com:8443/">Other port</a>
        "#;
        let links = extract_links(html, &page());
        assert_eq!(strings(links.same_site), vec!["https://example.com/local"]);
        assert_eq!(
            strings(links.external),
            vec!["https://www.rust-lang.org/", "https://example.com:8443/"]
        );
    }

    #[test]
    fn test_skip_anchor_and_mailto() {
        let html = r##"
            <a href="#section">Jump</a>
            <a href="mailto:test@example.com">Email</a>
            <a href="javascript:void(0)">Click</a>
        "##;
        assert_eq!(extract_links(html, &page()), PageLinks::default());
    }

    #[test]
    fn test_multiple_links_keep_document_order() {
        let html = r#"
            <a href="https://example.com/first">1</a>
            <a href="second">2</a>
            <a href="../third">3</a>
            <p>no link here</p>
        "#;
        assert_eq!(
            strings(extract_links(html, &page()).same_site),
            vec![
                "https://example.com/first",
                "https://example.com/page/second",
                "https://example.com/third",
            ]
        );
    }

    #[test]
    fn test_same_site_ignores_scheme_but_not_port() {
        let a = Url::parse("http://example.com/").unwrap();
        let b = Url::parse("https://EXAMPLE.com/x").unwrap();
        let c = Url::parse("https://example.com:8443/").unwrap();
        assert!(same_site(&a, &b));
        assert!(!same_site(&b, &c));
    }
}
