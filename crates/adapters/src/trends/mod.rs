//! Trend source adapters

pub mod scrape;
pub mod stub;

pub use scrape::{PageFormat, ScrapingTrendSource, TrendPage, TrendScraperConfig};
pub use stub::StubTrendSource;
