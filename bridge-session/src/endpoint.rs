//! Descriptions of where a capability provider lives.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::PathBuf;

/// Launch parameters for a provider spoken to over its stdin/stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioEndpoint {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl StdioEndpoint {
    /// Creates an endpoint that runs `command` with no arguments.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the working directory of the child.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Extra environment variables.
    #[must_use]
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Working directory, if overridden.
    #[must_use]
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.cwd.as_ref()
    }
}

/// Framing used for network providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubProtocol {
    /// POST per message; responses may be JSON or an SSE stream, and the
    /// provider may assign an `Mcp-Session-Id`.
    #[default]
    StreamableHttp,
    /// POST per message with a plain JSON response body.
    Http,
}

impl SubProtocol {
    /// Configuration spelling of the sub-protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StreamableHttp => "streamable_http",
            Self::Http => "http",
        }
    }
}

/// Location of a provider reachable over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpoint {
    url: String,
    sub_protocol: SubProtocol,
    headers: BTreeMap<String, String>,
}

impl HttpEndpoint {
    /// Creates a streamable HTTP endpoint for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sub_protocol: SubProtocol::default(),
            headers: BTreeMap::new(),
        }
    }

    /// Overrides the sub-protocol.
    #[must_use]
    pub fn sub_protocol(mut self, sub_protocol: SubProtocol) -> Self {
        self.sub_protocol = sub_protocol;
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Selected sub-protocol.
    #[must_use]
    pub const fn protocol(&self) -> SubProtocol {
        self.sub_protocol
    }

    /// Static request headers.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

/// Any provider location the session layer can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEndpoint {
    /// Child process over stdio.
    Stdio(StdioEndpoint),
    /// Network endpoint.
    Http(HttpEndpoint),
}

impl ProviderEndpoint {
    /// Shorthand for a stdio endpoint.
    #[must_use]
    pub fn stdio<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Stdio(StdioEndpoint::new(command).args(args))
    }

    /// Shorthand for a streamable HTTP endpoint.
    #[must_use]
    pub fn http(url: impl Into<String>) -> Self {
        Self::Http(HttpEndpoint::new(url))
    }

    /// Stable identifier used in logs and errors, such as
    /// `stdio:python:math_server.py` or `streamable_http:http://localhost:8000/mcp`.
    #[must_use]
    pub fn identifier(&self) -> String {
        match self {
            Self::Stdio(endpoint) => {
                let mut id = format!("stdio:{}", endpoint.command);
                if !endpoint.args.is_empty() {
                    id.push(':');
                    id.push_str(&endpoint.args.join(":"));
                }
                id
            }
            Self::Http(endpoint) => format!("{}:{}", endpoint.sub_protocol.as_str(), endpoint.url),
        }
    }
}

impl Display for ProviderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

impl From<StdioEndpoint> for ProviderEndpoint {
    fn from(value: StdioEndpoint) -> Self {
        Self::Stdio(value)
    }
}

impl From<HttpEndpoint> for ProviderEndpoint {
    fn from(value: HttpEndpoint) -> Self {
        Self::Http(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_stable() {
        let stdio = ProviderEndpoint::stdio("python", ["math_server.py"]);
        assert_eq!(stdio.identifier(), "stdio:python:math_server.py");

        let bare = ProviderEndpoint::from(StdioEndpoint::new("provider"));
        assert_eq!(bare.identifier(), "stdio:provider");

        let http = ProviderEndpoint::http("http://localhost:8000/mcp");
        assert_eq!(
            http.identifier(),
            "streamable_http:http://localhost:8000/mcp"
        );

        let plain = ProviderEndpoint::from(
            HttpEndpoint::new("http://localhost:9000/rpc").sub_protocol(SubProtocol::Http),
        );
        assert_eq!(plain.to_string(), "http:http://localhost:9000/rpc");
    }

    #[test]
    fn stdio_builder_accumulates() {
        let endpoint = StdioEndpoint::new("capability-provider")
            .args(["--catalog", "math"])
            .env("RUST_LOG", "debug")
            .cwd("/tmp");

        assert_eq!(endpoint.arguments(), ["--catalog", "math"]);
        assert_eq!(
            endpoint.environment().get("RUST_LOG").map(String::as_str),
            Some("debug")
        );
        assert_eq!(endpoint.working_dir(), Some(&PathBuf::from("/tmp")));
    }
}
