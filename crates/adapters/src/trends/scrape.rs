//! Trend aggregator scraping (trends24, getdaytrends)

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use trendposter_domain::{ScrapeError, TrendEntry, TrendSnapshot, TrendSource};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Supported aggregator page layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFormat {
    /// `.trend-card ol li a`
    Trends24,
    /// `table.table tbody tr` with name and post count cells
    GetDayTrends,
}

/// One aggregator to scrape
#[derive(Debug, Clone)]
pub struct TrendPage {
    pub name: String,
    /// Base URL; the region slug is appended as a path segment
    pub base_url: String,
    pub format: PageFormat,
}

impl TrendPage {
    pub fn trends24() -> Self {
        Self {
            name: "trends24".to_string(),
            base_url: "https://trends24.in".to_string(),
            format: PageFormat::Trends24,
        }
    }

    pub fn getdaytrends() -> Self {
        Self {
            name: "getdaytrends".to_string(),
            base_url: "https://getdaytrends.com".to_string(),
            format: PageFormat::GetDayTrends,
        }
    }

    fn url(&self, region: &str) -> String {
        format!("{}/{}/", self.base_url.trim_end_matches('/'), region)
    }
}

/// Scraper configuration
#[derive(Debug, Clone)]
pub struct TrendScraperConfig {
    /// Region slug, e.g. `united-states`
    pub region: String,
    /// Pages tried in order until one yields trends
    pub pages: Vec<TrendPage>,
    /// Entries kept per snapshot
    pub max_entries: usize,
    pub timeout_secs: u64,
}

impl Default for TrendScraperConfig {
    fn default() -> Self {
        Self {
            region: "united-states".to_string(),
            pages: vec![TrendPage::trends24(), TrendPage::getdaytrends()],
            max_entries: 30,
            timeout_secs: 15,
        }
    }
}

impl TrendScraperConfig {
    /// Longest a single `fetch` can take when every page runs to its timeout
    pub fn fetch_budget(&self) -> Duration {
        Duration::from_secs(self.timeout_secs).saturating_mul(self.pages.len().max(1) as u32)
    }
}

/// Scrapes public trend aggregators; falls through to the next page on failure
pub struct ScrapingTrendSource {
    client: Client,
    config: TrendScraperConfig,
}

impl ScrapingTrendSource {
    pub fn new(config: TrendScraperConfig) -> Result<Self, ScrapeError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ScrapeError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn fetch_page(&self, page: &TrendPage) -> Result<Vec<TrendEntry>, ScrapeError> {
        let url = page.url(&self.config.region);
        tracing::debug!(source = %page.name, url = %url, "Fetching trend page");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout
            } else {
                ScrapeError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Http {
                source_name: page.name.clone(),
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| ScrapeError::Network(e.to_string()))?;

        match page.format {
            PageFormat::Trends24 => parse_trends24(&html),
            PageFormat::GetDayTrends => parse_getdaytrends(&html),
        }
    }
}

#[async_trait]
impl TrendSource for ScrapingTrendSource {
    async fn fetch(&self) -> Result<TrendSnapshot, ScrapeError> {
        let mut last_error = ScrapeError::Empty;

        for page in &self.config.pages {
            match self.fetch_page(page).await {
                Ok(entries) if !entries.is_empty() => {
                    let snapshot = TrendSnapshot::new(time::OffsetDateTime::now_utc(), entries)
                        .top(self.config.max_entries);
                    tracing::info!(source = %page.name, count = snapshot.len(), "Fetched trends");
                    return Ok(snapshot);
                }
                Ok(_) => {
                    tracing::warn!(source = %page.name, "Trend page had no entries");
                    last_error = ScrapeError::Empty;
                }
                Err(e) => {
                    tracing::warn!(source = %page.name, error = %e, "Trend source failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Parse(format!("bad selector {}: {}", css, e)))
}

/// Parse a trends24 page; entries carry their 1-based rank
pub fn parse_trends24(html: &str) -> Result<Vec<TrendEntry>, ScrapeError> {
    let document = Html::parse_document(html);
    let card = selector(".trend-card")?;
    let link = selector("ol li a")?;

    let mut entries = Vec::new();
    for card in document.select(&card) {
        for a in card.select(&link) {
            let name = a.text().collect::<String>().trim().to_string();
            if !name.is_empty() {
                entries.push(TrendEntry::new(name, (entries.len() + 1) as f64));
            }
        }
    }

    Ok(entries)
}

/// Parse a getdaytrends page; entries carry the post volume when shown,
/// otherwise their rank
pub fn parse_getdaytrends(html: &str) -> Result<Vec<TrendEntry>, ScrapeError> {
    let document = Html::parse_document(html);
    let row = selector("table.table tbody tr")?;
    let cell = selector("td")?;
    let link = selector("a")?;

    let mut entries = Vec::new();
    for tr in document.select(&row) {
        let cells: Vec<_> = tr.select(&cell).collect();
        let Some(first) = cells.first() else {
            continue;
        };
        let Some(a) = first.select(&link).next() else {
            continue;
        };
        let name = a.text().collect::<String>().trim().to_string();
        if name.is_empty() {
            continue;
        }
        let volume = cells
            .get(1)
            .and_then(|c| parse_volume(&c.text().collect::<String>()));
        let rank = (entries.len() + 1) as f64;
        entries.push(TrendEntry::new(name, volume.unwrap_or(rank)));
    }

    Ok(entries)
}

/// Parse counts like `125K`, `1.2M tweets` or `12,345`
pub fn parse_volume(raw: &str) -> Option<f64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    let start = compact.find(|c: char| c.is_ascii_digit())?;
    let rest = &compact[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let number: f64 = rest[..end].parse().ok()?;
    let multiplier = match rest[end..].chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('K') => 1_000.0,
        Some('M') => 1_000_000.0,
        Some('B') => 1_000_000_000.0,
        _ => 1.0,
    };
    Some(number * multiplier)
}
