//! Sequential, domain-bound site crawler.
//!
//! The crawler starts from a business's root URL, performs a breadth-first
//! traversal restricted to that URL's network authority, and returns the
//! normalized text of every HTML page it reaches, up to a page cap.
//! Per-page failures are logged and skipped; a crawl never fails as a whole.

use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use sitedesk_shared::{CrawlConfig, Result, SiteDeskError};

use crate::text::normalize_document;

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("SiteDesk/", env!("CARGO_PKG_VERSION"));

/// Path suffixes that point at binary or media files, never at HTML.
const SKIPPED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".ico", ".bmp", ".tif", ".tiff", ".pdf",
    ".zip", ".rar", ".7z", ".tar", ".gz", ".tgz", ".bz2", ".xz", ".mp3", ".wav", ".ogg", ".mp4",
    ".mov", ".avi", ".webm", ".mkv", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".exe",
    ".dmg", ".woff", ".woff2", ".ttf",
];

// ---------------------------------------------------------------------------
// Crawl output
// ---------------------------------------------------------------------------

/// A crawled page ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawledPage {
    /// Absolute URL, fragment stripped.
    pub url: String,
    pub title: String,
    /// Normalized, length-bounded visible text. Never empty.
    pub text: String,
}

/// Summary of a completed crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlStats {
    /// Pages collected into the output.
    pub pages_collected: usize,
    /// URLs dequeued but not collected (non-HTML, empty, blocked, failed).
    pub pages_skipped: usize,
    /// Fetch failures (URL, error message).
    pub errors: Vec<(String, String)>,
    pub duration: Duration,
}

/// Pages plus stats from one crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutput {
    pub pages: Vec<CrawledPage>,
    pub stats: CrawlStats,
}

/// What a single fetch produced.
enum FetchedBody {
    /// An HTML document and the URL it was finally served from.
    Html { body: String, final_url: Url },
    /// Anything that is not `text/html`.
    NotHtml,
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Breadth-first crawler for a single business website.
pub struct Crawler {
    config: CrawlConfig,
    client: Client,
}

impl Crawler {
    /// Create a new crawler with the given configuration.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SiteDeskError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Crawl the site rooted at `root_url`, collecting at most `max_pages` pages.
    ///
    /// Only URLs whose authority (host and port) equals the root's are
    /// fetched. Every per-page error is swallowed.
    #[instrument(skip_all, fields(root_url = %root_url, max_pages = max_pages))]
    pub async fn crawl(&self, root_url: &Url, max_pages: usize) -> CrawlOutput {
        let start_time = Instant::now();
        let root = strip_fragment(root_url);
        let domain = authority(&root);

        // Every URL ever enqueued, so nothing is queued or fetched twice.
        let mut seen: HashSet<String> = HashSet::from([root.to_string()]);
        let mut queue: VecDeque<Url> = VecDeque::from([root]);
        let mut output = CrawlOutput::default();
        let mut fetched_any = false;

        info!(
            %domain,
            rate_limit_ms = self.config.rate_limit_ms,
            "starting crawl"
        );

        while let Some(url) = queue.pop_front() {
            if output.pages.len() >= max_pages {
                break;
            }

            if !self.config.allow_private_hosts && is_ssrf_target(&url) {
                warn!(%url, "SSRF protection: blocked");
                output.stats.pages_skipped += 1;
                continue;
            }

            if fetched_any && self.config.rate_limit_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.rate_limit_ms)).await;
            }
            fetched_any = true;

            let (body, final_url) = match fetch_page(&self.client, &url).await {
                Ok(FetchedBody::Html { body, final_url }) => (body, final_url),
                Ok(FetchedBody::NotHtml) => {
                    debug!(%url, "not HTML, skipping");
                    output.stats.pages_skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(%url, error = %e, "fetch failed, skipping");
                    output.stats.errors.push((url.to_string(), e.to_string()));
                    output.stats.pages_skipped += 1;
                    continue;
                }
            };

            if authority(&final_url) != domain {
                debug!(%url, %final_url, "redirected off-domain, skipping");
                output.stats.pages_skipped += 1;
                continue;
            }

            // A redirect target is the page's identity; it may already be seen.
            let final_url = strip_fragment(&final_url);
            if final_url != url && !seen.insert(final_url.to_string()) {
                debug!(%url, %final_url, "redirected to an already seen page, skipping");
                output.stats.pages_skipped += 1;
                continue;
            }

            let extracted = extract_page(&body, &final_url, self.config.max_text_chars);

            for link in extracted.links {
                if authority(&link) != domain || has_skipped_extension(&link) {
                    continue;
                }
                if seen.insert(link.to_string()) {
                    queue.push_back(link);
                }
            }

            if extracted.text.is_empty() {
                debug!(%url, "no visible text, skipping");
                output.stats.pages_skipped += 1;
                continue;
            }

            output.pages.push(CrawledPage {
                url: final_url.to_string(),
                title: extracted.title,
                text: extracted.text,
            });
        }

        output.stats.pages_collected = output.pages.len();
        output.stats.duration = start_time.elapsed();

        info!(
            pages_collected = output.stats.pages_collected,
            pages_skipped = output.stats.pages_skipped,
            errors = output.stats.errors.len(),
            duration_ms = output.stats.duration.as_millis(),
            "crawl completed"
        );

        output
    }
}

// ---------------------------------------------------------------------------
// URL helpers
// ---------------------------------------------------------------------------

/// The network authority of a URL: host, plus port when one is explicit.
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Copy of `url` without its `#fragment`.
pub fn strip_fragment(url: &Url) -> Url {
    let mut stripped = url.clone();
    stripped.set_fragment(None);
    stripped
}

/// Whether the URL path ends in a binary/media extension.
fn has_skipped_extension(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    SKIPPED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Page fetching and extraction
// ---------------------------------------------------------------------------

/// Fetch a single URL; non-HTML responses are reported, not parsed.
async fn fetch_page(client: &Client, url: &Url) -> Result<FetchedBody> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| SiteDeskError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SiteDeskError::Network(format!("{url}: HTTP {status}")));
    }

    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
    if !is_html {
        return Ok(FetchedBody::NotHtml);
    }

    let final_url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|e| SiteDeskError::Network(format!("{url}: body read failed: {e}")))?;

    Ok(FetchedBody::Html { body, final_url })
}

/// Title, text, and outbound links of one HTML page.
struct ExtractedPage {
    title: String,
    text: String,
    links: Vec<Url>,
}

/// Parse the body once and pull out everything the crawl needs.
///
/// Kept synchronous so the non-`Send` parsed document never lives across an await.
fn extract_page(body: &str, url: &Url, max_chars: usize) -> ExtractedPage {
    let doc = Html::parse_document(body);
    let page = normalize_document(&doc, url.as_str(), max_chars);
    ExtractedPage {
        title: page.title,
        text: page.text,
        links: extract_links(&doc, url),
    }
}

/// Extract all http(s) links from a document, resolved and fragment-stripped.
fn extract_links(doc: &Html, base_url: &Url) -> Vec<Url> {
    static LINK_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

    let mut links = Vec::new();
    for el in doc.select(&LINK_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        if let Ok(resolved) = base_url.join(href) {
            if resolved.scheme() == "http" || resolved.scheme() == "https" {
                links.push(strip_fragment(&resolved));
            }
        }
    }
    links
}
