//! Publish decision and posting-hours window

use chrono::Timelike;
use chrono_tz::Tz;
use time::OffsetDateTime;

use crate::model::{CandidateId, MatchResult};

/// Outcome of the policy gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Publish {
        candidate_id: CandidateId,
        matched: MatchResult,
    },
    NoMatch,
    NoCandidates,
}

/// Deterministic decision function selecting at most one candidate per cycle
#[derive(Debug, Clone, Copy)]
pub struct PolicyGate {
    min_relevance_score: u8,
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self::new(40)
    }
}

impl PolicyGate {
    pub fn new(min_relevance_score: u8) -> Self {
        Self {
            min_relevance_score: min_relevance_score.min(100),
        }
    }

    pub fn min_relevance_score(&self) -> u8 {
        self.min_relevance_score
    }

    /// Pick the highest scoring match at or above the threshold.
    ///
    /// `matches` must be in queue order (priority desc, created_at asc); on
    /// equal scores the earlier entry wins.
    pub fn decide(&self, matches: &[MatchResult]) -> Decision {
        if matches.is_empty() {
            return Decision::NoCandidates;
        }

        let mut best: Option<&MatchResult> = None;
        for m in matches
            .iter()
            .filter(|m| m.relevance_score >= self.min_relevance_score)
        {
            match best {
                Some(current) if current.relevance_score >= m.relevance_score => {}
                _ => best = Some(m),
            }
        }

        match best {
            Some(m) => Decision::Publish {
                candidate_id: m.candidate_id,
                matched: m.clone(),
            },
            None => Decision::NoMatch,
        }
    }
}

/// Half-open `[start_hour, end_hour)` window in a named timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingWindow {
    start_hour: u8,
    end_hour: u8,
    tz: Tz,
}

impl PostingWindow {
    pub fn new(start_hour: u8, end_hour: u8, tz: Tz) -> Result<Self, WindowError> {
        if start_hour > 23 || end_hour > 23 {
            return Err(WindowError::HourOutOfRange);
        }
        if start_hour >= end_hour {
            return Err(WindowError::Empty {
                start: start_hour,
                end: end_hour,
            });
        }
        Ok(Self {
            start_hour,
            end_hour,
            tz,
        })
    }

    /// Parse an IANA timezone name such as `America/New_York`
    pub fn parse_timezone(name: &str) -> Result<Tz, WindowError> {
        name.parse::<Tz>()
            .map_err(|_| WindowError::UnknownTimezone(name.to_string()))
    }

    pub fn start_hour(&self) -> u8 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u8 {
        self.end_hour
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Whether `at` falls inside the window, evaluated in the window's timezone
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        let Some(utc) = chrono::DateTime::from_timestamp(at.unix_timestamp(), at.nanosecond())
        else {
            return false;
        };
        let hour = utc.with_timezone(&self.tz).hour();
        hour >= u32::from(self.start_hour) && hour < u32::from(self.end_hour)
    }
}

impl Default for PostingWindow {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 22,
            tz: Tz::UTC,
        }
    }
}

/// Posting window configuration errors
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("posting hours must be between 0 and 23")]
    HourOutOfRange,
    #[error("posting window [{start}, {end}) is empty")]
    Empty { start: u8, end: u8 },
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
}
