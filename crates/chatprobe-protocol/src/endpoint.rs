use std::fmt;

use thiserror::Error;
use url::Url;

/// Chat route of a local development server.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080/api/realtime/chat";

#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("invalid server url {url:?}: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported scheme {0:?}, expected ws or wss")]
    Scheme(String),

    #[error("server url cannot take a path: {0}")]
    NotHierarchical(String),

    #[error("session id must not be empty")]
    EmptySession,
}

/// Chat socket of one order: `<server_url>/<session_id>`.
///
/// The bearer token is only attached by [`ChatEndpoint::with_token`], so the
/// endpoint itself is safe to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEndpoint {
    url: Url,
}

impl ChatEndpoint {
    pub fn new(server_url: &str, session_id: &str) -> Result<Self, EndpointError> {
        let mut url = Url::parse(server_url).map_err(|source| EndpointError::Parse {
            url: server_url.to_string(),
            source,
        })?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(EndpointError::Scheme(other.to_string())),
        }

        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(EndpointError::EmptySession);
        }

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| EndpointError::NotHierarchical(server_url.to_string()))?;
            segments.pop_if_empty().push(session_id);
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL to dial, with the credential as the `token` query parameter.
    pub fn with_token(&self, token: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("token", token);
        url
    }
}

impl fmt::Display for ChatEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_becomes_last_path_segment() {
        let ep = ChatEndpoint::new(DEFAULT_SERVER_URL, "2").unwrap();
        assert_eq!(ep.to_string(), "ws://localhost:8080/api/realtime/chat/2");
    }

    #[test]
    fn trailing_slash_and_query_are_dropped() {
        let ep = ChatEndpoint::new("wss://chat.example.com/api/realtime/chat/?x=1", "42").unwrap();
        assert_eq!(ep.to_string(), "wss://chat.example.com/api/realtime/chat/42");
    }

    #[test]
    fn token_goes_into_query() {
        let ep = ChatEndpoint::new(DEFAULT_SERVER_URL, "2").unwrap();
        let url = ep.with_token("eyJhbGciOiJIUzI1NiJ9.e30.sig-_x");
        assert_eq!(
            url.as_str(),
            "ws://localhost:8080/api/realtime/chat/2?token=eyJhbGciOiJIUzI1NiJ9.e30.sig-_x"
        );
        assert_eq!(ep.url().query(), None);
    }

    #[test]
    fn rejects_http_scheme() {
        let err = ChatEndpoint::new("http://localhost:8080/chat", "2").unwrap_err();
        assert!(matches!(err, EndpointError::Scheme(s) if s == "http"));
    }

    #[test]
    fn rejects_blank_session() {
        assert!(matches!(
            ChatEndpoint::new(DEFAULT_SERVER_URL, "  "),
            Err(EndpointError::EmptySession)
        ));
    }

    #[test]
    fn rejects_garbage_url() {
        assert!(matches!(
            ChatEndpoint::new("not a url", "2"),
            Err(EndpointError::Parse { .. })
        ));
    }
}
