//! Probes and the substring expectations applied to their output.
//!
//! A probe produces raw text: an HTTP response body, or the stdout of a
//! command run inside a mesh pod. Nothing else about the response is
//! inspected.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::apps::Sleep;
use crate::Result;

/// Where an HTTP probe is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpTarget {
    /// Absolute URL
    Url(String),
    /// Path on the mesh ingress gateway, e.g. `/productpage`
    Ingress(String),
}

/// A request whose textual output is checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// HTTP GET from the runner host; the body is the output
    Http {
        /// Request target
        target: HttpTarget,
    },
    /// Shell command inside the first running pod matching `selector`
    Exec {
        /// Pod namespace
        namespace: &'static str,
        /// Pod label selector
        selector: &'static str,
        /// Container to exec into
        container: Option<&'static str>,
        /// Command line, run with `sh -c`
        command: String,
    },
}

impl Probe {
    /// GET a path on the ingress gateway
    pub fn ingress(path: impl Into<String>) -> Self {
        Probe::Http {
            target: HttpTarget::Ingress(path.into()),
        }
    }

    /// GET an absolute URL
    pub fn url(url: impl Into<String>) -> Self {
        Probe::Http {
            target: HttpTarget::Url(url.into()),
        }
    }

    /// Run a command in the sleep pod's `sleep` container
    pub fn from_sleep(command: impl Into<String>) -> Self {
        Probe::Exec {
            namespace: crate::APP_NAMESPACE,
            selector: Sleep::SELECTOR,
            container: Some(Sleep::CONTAINER),
            command: command.into(),
        }
    }

    /// `curl` from the sleep pod that prints only the response headers of
    /// the final hop, following redirects
    pub fn headers_from_sleep(url: &str) -> Self {
        Self::from_sleep(format!("curl -sSL -o /dev/null -D - {}", url))
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Http {
                target: HttpTarget::Url(url),
            } => write!(f, "GET {}", url),
            Probe::Http {
                target: HttpTarget::Ingress(path),
            } => write!(f, "GET <ingress>{}", path),
            Probe::Exec {
                namespace,
                selector,
                command,
                ..
            } => write!(f, "exec [{}/{}] {}", namespace, selector, command),
        }
    }
}

/// Substring checks over probe output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Output contains the text
    Contains(String),
    /// Output does not contain the text
    Absent(String),
    /// Every inner expectation holds
    All(Vec<Expectation>),
    /// At least one inner expectation holds
    Any(Vec<Expectation>),
}

impl Expectation {
    /// Output contains `text`
    pub fn contains(text: impl Into<String>) -> Self {
        Expectation::Contains(text.into())
    }

    /// Output does not contain `text`
    pub fn absent(text: impl Into<String>) -> Self {
        Expectation::Absent(text.into())
    }

    /// Output contains every one of `texts`
    pub fn contains_all<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expectation::All(texts.into_iter().map(Self::contains).collect())
    }

    /// Output contains none of `texts`
    pub fn absent_all<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expectation::All(texts.into_iter().map(Self::absent).collect())
    }

    /// Whether `output` satisfies the expectation
    pub fn matches(&self, output: &str) -> bool {
        match self {
            Expectation::Contains(text) => output.contains(text.as_str()),
            Expectation::Absent(text) => !output.contains(text.as_str()),
            Expectation::All(inner) => inner.iter().all(|e| e.matches(output)),
            Expectation::Any(inner) => inner.iter().any(|e| e.matches(output)),
        }
    }

    /// Human-readable form used in failure messages
    pub fn describe(&self) -> String {
        fn join(inner: &[Expectation], sep: &str) -> String {
            inner
                .iter()
                .map(Expectation::describe)
                .collect::<Vec<_>>()
                .join(sep)
        }
        match self {
            Expectation::Contains(text) => format!("contains {:?}", text),
            Expectation::Absent(text) => format!("does not contain {:?}", text),
            Expectation::All(inner) => format!("({})", join(inner, " and ")),
            Expectation::Any(inner) => format!("({})", join(inner, " or ")),
        }
    }
}

/// Issues HTTP GETs for [`Probe::Http`]
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpProber: Send + Sync {
    /// Fetch `url` and return the body as text, whatever the status code
    async fn get(&self, url: &str) -> Result<String>;
}

/// [`HttpProber`] backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestProber {
    client: reqwest::Client,
}

impl ReqwestProber {
    /// Client with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProber for ReqwestProber {
    async fn get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        tracing::debug!(url, status = %response.status(), "HTTP probe response");
        Ok(response.text().await?)
    }
}

/// Clip long probe output for failure messages
pub fn excerpt(output: &str, limit: usize) -> &str {
    match output.char_indices().nth(limit) {
        Some((idx, _)) => &output[..idx],
        None => output,
    }
}
