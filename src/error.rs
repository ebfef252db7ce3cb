use thiserror::Error;

/// A required field that could not be pulled out of detail-page markup.
///
/// These are raised by the pure parser and carry no URL; the orchestrator
/// wraps them in [`HarvestError::Parse`] so failures name the offending page.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not extract event title")]
    TitleNotFound,

    #[error("could not extract date")]
    DateNotFound,

    #[error("could not extract participants")]
    ParticipantsNotFound,
}

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Transport-level failure that survived every retry attempt.
    #[error("fetch failed for {url} after {attempts} attempts: {source}")]
    TransientFetch {
        url: String,
        attempts: usize,
        source: reqwest::Error,
    },

    /// Non-200 on a page whose success is mandatory (listing page, probe,
    /// participation fallback).
    #[error("unexpected status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("{source} (url={url})")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },

    /// A walked listing page yielded zero event URLs. Always fatal: it means
    /// the site markup drifted or the walker is mis-targeted, and treating it
    /// as "no new events" would silently desynchronize page-number
    /// assumptions.
    #[error("no event URLs found on page {page}")]
    EmptyListingPage { page: u32 },

    #[error("could not detect oldest page ({reason})")]
    BoundaryDetection { reason: &'static str },

    #[error("{0}")]
    Config(String),

    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    pub fn parse(url: impl Into<String>, source: ParseError) -> Self {
        HarvestError::Parse {
            url: url.into(),
            source,
        }
    }
}
