use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::XrefError;
use crate::resolver::ID_PLACEHOLDER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_retries() -> usize {
    3
}

pub trait LinkProbe: Send + Sync {
    fn check(&self, url: &str) -> Result<(), XrefError>;
}

pub fn link_for(access_url: &str, identifier: &str) -> String {
    access_url.replace(ID_PLACEHOLDER, identifier)
}

#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
    retries: usize,
}

impl HttpProbe {
    pub fn new(settings: ProbeSettings) -> Result<Self, XrefError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-xref/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| XrefError::ProbeHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|err| XrefError::ProbeHttp(err.to_string()))?;
        Ok(Self {
            client,
            retries: settings.retries,
        })
    }
}

impl LinkProbe for HttpProbe {
    fn check(&self, url: &str) -> Result<(), XrefError> {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.head(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.retries && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    if !resp.status().is_success() {
                        return Err(XrefError::ProbeStatus {
                            status,
                            url: url.to_string(),
                        });
                    }
                    return Ok(());
                }
                Err(err) if err.is_timeout() => {
                    if attempt < self.retries {
                        debug!(url, attempt, "probe timed out; retrying");
                        attempt += 1;
                        continue;
                    }
                    return Err(XrefError::ProbeTimeout {
                        url: url.to_string(),
                        attempts: attempt + 1,
                    });
                }
                Err(err) => {
                    if attempt < self.retries && err.is_connect() {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(XrefError::ProbeHttp(err.to_string()));
                }
            }
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
