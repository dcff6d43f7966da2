use reqwest::StatusCode;

/// Boxed cause of a transport failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Broad failure category of a relay, used by callers to classify a
/// terminated transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayErrorKind {
    /// The source could not be fetched or its stream broke off.
    SourceFetch,
    /// The destination could not be reached or the upload stream failed.
    DestinationTransport,
    /// The destination answered with an unexpected status code.
    DestinationStatus,
    /// The destination's success body could not be understood.
    ResponseParse,
    /// The relay itself could not be set up.
    Setup,
}

impl RelayErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceFetch => "source_fetch",
            Self::DestinationTransport => "destination_transport",
            Self::DestinationStatus => "destination_status",
            Self::ResponseParse => "response_parse",
            Self::Setup => "setup",
        }
    }
}

impl std::fmt::Display for RelayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Source video error: {status}")]
    SourceStatus { status: StatusCode, url: String },

    #[error("Source request failed: {source}")]
    SourceTransport {
        #[source]
        source: reqwest::Error,
    },

    #[error("Source stream interrupted: {reason}")]
    SourceRead { reason: String },

    #[error("Too many redirects fetching source (limit {limit}), last location {url}")]
    TooManyRedirects { limit: usize, url: String },

    #[error("Redirect loop detected at {url}")]
    RedirectLoop { url: String },

    #[error("Invalid redirect location `{location}`: {reason}")]
    InvalidRedirect { location: String, reason: String },

    #[error("Destination request failed: {source}")]
    DestinationTransport {
        #[source]
        source: BoxError,
    },

    #[error("Destination error: {status}")]
    DestinationStatus { status: StatusCode, body: String },

    #[error("Failed to parse destination response: {reason}")]
    ResponseParse { reason: String },

    #[error("HTTP client error: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    #[error("Relay setup failed: {reason}")]
    Setup { reason: String },
}

impl RelayError {
    pub fn source_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::SourceStatus {
            status,
            url: url.into(),
        }
    }

    pub fn invalid_redirect(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRedirect {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn destination_transport(source: impl Into<BoxError>) -> Self {
        Self::DestinationTransport {
            source: source.into(),
        }
    }

    pub fn setup(reason: impl Into<String>) -> Self {
        Self::Setup {
            reason: reason.into(),
        }
    }

    pub fn response_parse(reason: impl Into<String>) -> Self {
        Self::ResponseParse {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> RelayErrorKind {
        match self {
            Self::SourceStatus { .. }
            | Self::SourceTransport { .. }
            | Self::SourceRead { .. }
            | Self::TooManyRedirects { .. }
            | Self::RedirectLoop { .. }
            | Self::InvalidRedirect { .. } => RelayErrorKind::SourceFetch,
            Self::DestinationTransport { .. } => RelayErrorKind::DestinationTransport,
            Self::DestinationStatus { .. } => RelayErrorKind::DestinationStatus,
            Self::ResponseParse { .. } => RelayErrorKind::ResponseParse,
            Self::Client { .. } | Self::Setup { .. } => RelayErrorKind::Setup,
        }
    }

    /// HTTP status attached to the failure, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::SourceStatus { status, .. } | Self::DestinationStatus { status, .. } => {
                Some(*status)
            }
            Self::SourceTransport { source } | Self::Client { source } => source.status(),
            _ => None,
        }
    }
}
