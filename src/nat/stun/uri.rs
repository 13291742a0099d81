//! STUN URIs as defined in RFC 7064: `stun:host[:port]` and `stuns:host[:port]`.

use std::fmt;
use std::str::FromStr;
use crate::nat::error::UriError;

/// Scheme definitions from RFC 7064 Section 3.2
pub const SCHEME: &str = "stun";
pub const SCHEME_SECURE: &str = "stuns";

/// Parsed STUN URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: String,
    /// Host name or IP literal, without IPv6 brackets
    pub host: String,
    /// `None` when the URI carries no port
    pub port: Option<u16>,
}

impl Uri {
    /// Parse URI from string
    pub fn parse(raw: &str) -> Result<Self, UriError> {
        let (scheme, opaque) = raw.split_once(':').ok_or(UriError::MissingScheme)?;
        let scheme = scheme.to_ascii_lowercase();

        if scheme != SCHEME && scheme != SCHEME_SECURE {
            return Err(UriError::UnknownScheme(scheme));
        }
        // `stun://host` is hierarchical, RFC 7064 only allows the opaque form
        if opaque.is_empty() || opaque.starts_with('/') {
            return Err(UriError::ExpectedOpaque);
        }

        let (host, port) = split_host_port(opaque)?;
        if host.is_empty() {
            return Err(UriError::InvalidHost(opaque.to_string()));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    /// Whether `raw` should be handled as a URI rather than `host:port`
    pub fn looks_like_uri(raw: &str) -> bool {
        let lower = raw.to_ascii_lowercase();
        lower.starts_with("stun:") || lower.starts_with("stuns:") || raw.contains("://")
    }
}

fn split_host_port(opaque: &str) -> Result<(&str, Option<u16>), UriError> {
    let (host, raw_port) = if let Some(rest) = opaque.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| UriError::InvalidHost(opaque.to_string()))?;
        match after {
            "" => (host, None),
            _ => match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(UriError::InvalidHost(opaque.to_string())),
            },
        }
    } else {
        match opaque.matches(':').count() {
            0 => (opaque, None),
            1 => {
                let (host, port) = opaque.split_once(':').unwrap_or((opaque, ""));
                (host, Some(port))
            }
            // Unbracketed IPv6 literal
            _ => (opaque, None),
        }
    };

    let port = match raw_port {
        None | Some("") => None,
        Some(port) => {
            let port = port.parse::<u16>()
                .map_err(|_| UriError::InvalidPort(port.to_string()))?;
            // Port 0 means "not given"
            (port != 0).then_some(port)
        }
    };

    Ok((host, port))
}

impl FromStr for Uri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}
