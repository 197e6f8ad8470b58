//! The `pixnet://` URL scheme (§6.3): `pixnet://[host[:port]][/path][?query]`.
//!
//! Parsing is deliberately small and dependency-free — just enough
//! structure for the category-map interpreter to validate a `Navigate`
//! behavior's target and for a client to build the initial `"navigate"`
//! `PIXEVT` payload.

use crate::error::{PixnetError, PxntError, PxntErrorCode};

/// Default port for the `pixnet://` scheme and the wire protocol (§6.1, §6.3).
pub const DEFAULT_PORT: u16 = 7621;

const SCHEME: &str = "pixnet://";

/// A parsed `pixnet://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixnetUrl {
    /// DNS name or IPv4/IPv6 literal. Empty when the URL omits a host
    /// (a path-only reference resolved against the current connection).
    pub host: String,
    /// Port, defaulting to [`DEFAULT_PORT`] when absent.
    pub port: u16,
    /// Path component, always starting with `/` (or empty for a bare host).
    pub path: String,
    /// Raw query string, without the leading `?` (empty if absent).
    pub query: String,
}

impl PixnetUrl {
    /// Parses a `pixnet://` URL, rejecting anything that does not start
    /// with the scheme or whose host is not a plausible DNS name / IP
    /// literal.
    pub fn parse(raw: &str) -> Result<Self, PixnetError> {
        let rest = raw.strip_prefix(SCHEME).ok_or_else(|| url_error(format!("missing pixnet:// scheme in {raw:?}")))?;

        let (authority, path_and_query) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let (host, port) = if authority.is_empty() {
            (String::new(), DEFAULT_PORT)
        } else if authority.starts_with('[') {
            // IPv6 literal: [::1]:7621
            let close = authority.find(']').ok_or_else(|| url_error("unterminated IPv6 literal"))?;
            let host = authority[1..close].to_string();
            let after = authority[close + 1..].strip_prefix(':').unwrap_or("");
            let port = parse_port(after)?;
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((h, p)) => (h.to_string(), parse_port(p)?),
                None => (authority.to_string(), DEFAULT_PORT),
            }
        };

        if !host.is_empty() && !is_valid_host(&host) {
            return Err(url_error(format!("invalid host {host:?}")));
        }

        let (path, query) = match path_and_query.find('?') {
            Some(idx) => (&path_and_query[..idx], &path_and_query[idx + 1..]),
            None => (path_and_query, ""),
        };

        Ok(Self {
            host,
            port,
            path: path.to_string(),
            query: query.to_string(),
        })
    }

    /// The bytes sent as the initial `"navigate"` `PIXEVT` payload: the
    /// path and query, UTF-8 encoded (§6.3's "client sends path and query
    /// as part of the initial PIXEVT" design decision).
    #[must_use]
    pub fn path_and_query_bytes(&self) -> Vec<u8> {
        if self.query.is_empty() {
            self.path.clone().into_bytes()
        } else {
            format!("{}?{}", self.path, self.query).into_bytes()
        }
    }

    /// True if `port` is in the well-known range (< 1024); §6.3 says this
    /// produces a warning but is not blocked.
    #[must_use]
    pub fn uses_well_known_port(&self) -> bool {
        self.port < 1024
    }
}

fn parse_port(s: &str) -> Result<u16, PixnetError> {
    if s.is_empty() {
        return Ok(DEFAULT_PORT);
    }
    s.parse::<u16>().map_err(|e| url_error(format!("invalid port {s:?}: {e}")))
}

fn is_valid_host(host: &str) -> bool {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }
    !host.is_empty()
        && host.len() <= 253
        && host
            .split('.')
            .all(|label| !label.is_empty() && label.len() <= 63 && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

fn url_error(message: impl Into<String>) -> PixnetError {
    PxntError::format(PxntErrorCode::InvalidDimensions, message).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_path_query() {
        let url = PixnetUrl::parse("pixnet://example.com:8080/next?x=1").unwrap();
        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, 8080);
        assert_eq!(url.path, "/next");
        assert_eq!(url.query, "x=1");
    }

    #[test]
    fn defaults_port_when_absent() {
        let url = PixnetUrl::parse("pixnet://example.com/home").unwrap();
        assert_eq!(url.port, DEFAULT_PORT);
    }

    #[test]
    fn path_only_reference() {
        let url = PixnetUrl::parse("pixnet:///next").unwrap();
        assert_eq!(url.host, "");
        assert_eq!(url.path, "/next");
    }

    #[test]
    fn ipv6_literal_host() {
        let url = PixnetUrl::parse("pixnet://[::1]:7621/a").unwrap();
        assert_eq!(url.host, "::1");
        assert_eq!(url.port, 7621);
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(PixnetUrl::parse("http://example.com/").is_err());
    }

    #[test]
    fn path_and_query_bytes_round_trip() {
        let url = PixnetUrl::parse("pixnet://example.com/next?x=1").unwrap();
        assert_eq!(url.path_and_query_bytes(), b"/next?x=1".to_vec());
    }

    #[test]
    fn well_known_port_flag() {
        let url = PixnetUrl::parse("pixnet://example.com:80/").unwrap();
        assert!(url.uses_well_known_port());
    }
}
