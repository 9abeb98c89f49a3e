//! Immutable RPC endpoint URL.
//!
//! A [`Url`] names one exported or subscribed endpoint:
//! `protocol://host[:port]/path[?key=value&...]`. Parameters keep their
//! insertion order, and [`Url::to_full_string`] renders them in that order,
//! so the canonical string is a literal identity: two URLs that differ only
//! in parameter order are different entries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Parameter naming which side of a call the URL describes.
pub const SIDE_KEY: &str = "side";
/// `side` value for provider (exporting) endpoints.
pub const PROVIDER_SIDE: &str = "provider";
/// `side` value for consumer (subscribing) endpoints.
pub const CONSUMER_SIDE: &str = "consumer";
pub const GROUP_KEY: &str = "group";
pub const VERSION_KEY: &str = "version";
/// Overrides the path as the service interface name.
pub const INTERFACE_KEY: &str = "interface";
/// Protocol filter carried on subscription URLs.
pub const PROTOCOL_KEY: &str = "protocol";
/// Wildcard matching every interface, group, or version.
pub const ANY_VALUE: &str = "*";

/// Errors from parsing a URL string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("url is empty")]
    Empty,
    #[error("url has no protocol: {url}")]
    MissingProtocol { url: String },
    #[error("invalid port {port:?} in url: {url}")]
    InvalidPort { url: String, port: String },
}

/// Builds the service key for an interface with optional group and version.
///
/// Layout is `group/interface:version`; empty group or version segments are
/// omitted.
#[must_use]
pub fn build_service_key(interface: &str, group: Option<&str>, version: Option<&str>) -> String {
    let mut key = String::with_capacity(interface.len() + 16);
    if let Some(group) = group.filter(|g| !g.is_empty()) {
        key.push_str(group);
        key.push('/');
    }
    key.push_str(interface);
    if let Some(version) = version.filter(|v| !v.is_empty()) {
        key.push(':');
        key.push_str(version);
    }
    key
}

/// An immutable endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Url {
    protocol: String,
    host: String,
    port: Option<u16>,
    path: String,
    parameters: Vec<(String, String)>,
}

impl Url {
    /// Creates a URL without parameters. A leading `/` on `path` is dropped.
    #[must_use]
    pub fn new(
        protocol: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        path: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            path: path.trim_start_matches('/').to_string(),
            parameters: Vec::new(),
        }
    }

    /// Parses `protocol://host[:port]/path?k=v&...`.
    ///
    /// Repeated parameter keys keep the first position and the last value.
    /// A bare `key` without `=` gets an empty value.
    ///
    /// # Errors
    ///
    /// Returns [`UrlError`] if the string is empty, lacks a protocol, or has
    /// a port that is not a valid `u16`.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(UrlError::Empty);
        }

        let Some((protocol, rest)) = input.split_once("://") else {
            return Err(UrlError::MissingProtocol {
                url: input.to_string(),
            });
        };
        if protocol.is_empty() {
            return Err(UrlError::MissingProtocol {
                url: input.to_string(),
            });
        }

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };
        let (authority, path) = location.split_once('/').unwrap_or((location, ""));

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| UrlError::InvalidPort {
                    url: input.to_string(),
                    port: port.to_string(),
                })?;
                (host, Some(port))
            }
            None => (authority, None),
        };

        let mut url = Self::new(protocol, host, port, path);
        for pair in query.unwrap_or_default().split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if !key.is_empty() {
                url.put_parameter(key, value);
            }
        }
        Ok(url)
    }

    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path without its leading `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port`, or just `host` when no port is set.
    #[must_use]
    pub fn address(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }

    /// Looks up a parameter value.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parameters in insertion order.
    #[must_use]
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Returns a copy with `key` set to `value`.
    ///
    /// An existing key keeps its position; a new key is appended.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.put_parameter(&key.into(), &value.into());
        self
    }

    /// Returns a copy without `key`.
    #[must_use]
    pub fn without_parameter(mut self, key: &str) -> Self {
        self.parameters.retain(|(k, _)| k != key);
        self
    }

    /// The service interface: the `interface` parameter, else the path.
    #[must_use]
    pub fn service_interface(&self) -> &str {
        self.parameter(INTERFACE_KEY)
            .filter(|i| !i.is_empty())
            .unwrap_or(&self.path)
    }

    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.parameter(GROUP_KEY)
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.parameter(VERSION_KEY)
    }

    #[must_use]
    pub fn side(&self) -> Option<&str> {
        self.parameter(SIDE_KEY)
    }

    /// Returns `true` when the URL is marked `side=provider`.
    #[must_use]
    pub fn is_provider(&self) -> bool {
        self.side() == Some(PROVIDER_SIDE)
    }

    /// Service key derived from interface, group and version.
    #[must_use]
    pub fn service_key(&self) -> String {
        build_service_key(self.service_interface(), self.group(), self.version())
    }

    /// Canonical string form including every parameter, in insertion order.
    #[must_use]
    pub fn to_full_string(&self) -> String {
        let mut out = String::with_capacity(64);
        out.push_str(&self.protocol);
        out.push_str("://");
        out.push_str(&self.address());
        if !self.path.is_empty() {
            out.push('/');
            out.push_str(&self.path);
        }
        for (i, (key, value)) in self.parameters.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    fn put_parameter(&mut self, key: &str, value: &str) {
        match self.parameters.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => value.clone_into(&mut entry.1),
            None => self.parameters.push((key.to_string(), value.to_string())),
        }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_full_string())
    }
}

impl FromStr for Url {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Url {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_full_string())
    }
}

impl<'de> Deserialize<'de> for Url {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SERVICE: &str = "org.lodestar.test.TestService";

    #[test]
    fn parse_full_url() {
        let url = Url::parse(
            "dubbo://127.0.0.1:20880/org.lodestar.test.TestService?side=provider&group=g&version=1.0.0",
        )
        .unwrap();

        assert_eq!(url.protocol(), "dubbo");
        assert_eq!(url.host(), "127.0.0.1");
        assert_eq!(url.port(), Some(20880));
        assert_eq!(url.path(), TEST_SERVICE);
        assert_eq!(url.side(), Some(PROVIDER_SIDE));
        assert_eq!(url.group(), Some("g"));
        assert_eq!(url.version(), Some("1.0.0"));
        assert!(url.is_provider());
    }

    #[test]
    fn parse_without_port_or_query() {
        let url = Url::parse("rest://example.org/Svc").unwrap();
        assert_eq!(url.port(), None);
        assert_eq!(url.address(), "example.org");
        assert!(url.parameters().is_empty());
        assert_eq!(url.to_full_string(), "rest://example.org/Svc");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_eq!(Url::parse("  "), Err(UrlError::Empty));
        assert!(matches!(
            Url::parse("127.0.0.1:20880/Svc"),
            Err(UrlError::MissingProtocol { .. })
        ));
        assert!(matches!(
            Url::parse("://h/Svc"),
            Err(UrlError::MissingProtocol { .. })
        ));
        assert!(matches!(
            Url::parse("dubbo://h:99999/Svc"),
            Err(UrlError::InvalidPort { .. })
        ));
    }

    #[test]
    fn full_string_preserves_parameter_order() {
        let a = Url::new("dubbo", "h", Some(1), "Svc")
            .with_parameter("a", "1")
            .with_parameter("b", "2");
        let b = Url::new("dubbo", "h", Some(1), "Svc")
            .with_parameter("b", "2")
            .with_parameter("a", "1");

        assert_eq!(a.to_full_string(), "dubbo://h:1/Svc?a=1&b=2");
        assert_eq!(b.to_full_string(), "dubbo://h:1/Svc?b=2&a=1");
        assert_ne!(a.to_full_string(), b.to_full_string());
    }

    #[test]
    fn with_parameter_replaces_in_place() {
        let url = Url::new("dubbo", "h", Some(1), "Svc")
            .with_parameter("a", "1")
            .with_parameter("b", "2")
            .with_parameter("a", "3");
        assert_eq!(url.to_full_string(), "dubbo://h:1/Svc?a=3&b=2");

        let url = url.without_parameter("a");
        assert_eq!(url.to_full_string(), "dubbo://h:1/Svc?b=2");
    }

    #[test]
    fn parsed_full_string_is_stable() {
        let raw = "dubbo://10.0.0.1:20880/Svc?side=provider&flag=&group=g";
        let url = Url::parse(raw).unwrap();
        assert_eq!(url.to_full_string(), raw);
        assert_eq!(url.to_string(), raw);
        assert_eq!(raw.parse::<Url>().unwrap(), url);
    }

    #[test]
    fn service_key_uses_group_and_version() {
        let base = Url::new("dubbo", "127.0.0.1", Some(20880), TEST_SERVICE);
        assert_eq!(base.service_key(), TEST_SERVICE);

        let grouped = base.clone().with_parameter(GROUP_KEY, "test");
        assert_eq!(grouped.service_key(), format!("test/{TEST_SERVICE}"));

        let versioned = grouped.with_parameter(VERSION_KEY, "1.0.0");
        assert_eq!(
            versioned.service_key(),
            format!("test/{TEST_SERVICE}:1.0.0")
        );
    }

    #[test]
    fn interface_parameter_overrides_path() {
        let url = Url::new("dubbo", "h", Some(1), "alias").with_parameter(INTERFACE_KEY, "Real");
        assert_eq!(url.service_interface(), "Real");
        assert_eq!(url.service_key(), "Real");
    }

    #[test]
    fn build_service_key_skips_empty_segments() {
        assert_eq!(build_service_key("Svc", Some(""), Some("")), "Svc");
        assert_eq!(build_service_key("Svc", None, Some("2")), "Svc:2");
        assert_eq!(build_service_key("Svc", Some("g"), None), "g/Svc");
    }

    #[test]
    fn serde_uses_full_string() {
        let url = Url::new("dubbo", "h", Some(7), "Svc").with_parameter(SIDE_KEY, CONSUMER_SIDE);
        let json = serde_json::to_string(&url).unwrap();
        assert_eq!(json, "\"dubbo://h:7/Svc?side=consumer\"");
        let back: Url = serde_json::from_str(&json).unwrap();
        assert_eq!(back, url);
    }
}
