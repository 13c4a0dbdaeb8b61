//! HTTP probe implementation.

use std::collections::HashMap;

use chrono::{Local, NaiveDate};
use regex::Regex;
use reqwest::{redirect, Method};

use super::{Check, ProbeError, ProbeTarget};

const USER_AGENT: &str = "cachet-monitor";
const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD"];

/// Response body pattern with `%year%`, `%month%` and `%day%` tokens.
///
/// The tokens are replaced with the current local date, so the compiled
/// regex is rebuilt whenever the date changes.
#[derive(Debug)]
pub struct BodyMatcher {
    pattern: String,
    compiled: Option<(NaiveDate, String, Regex)>,
}

impl BodyMatcher {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            compiled: None,
        }
    }

    /// The pattern and regex in effect on `date`.
    pub fn for_date(&mut self, date: NaiveDate) -> Result<(&str, &Regex), regex::Error> {
        let entry = match self.compiled.take() {
            Some(entry) if entry.0 == date => entry,
            _ => {
                let expanded = expand_date_tokens(&self.pattern, date);
                let regex = Regex::new(&expanded)?;
                (date, expanded, regex)
            }
        };

        let (_, expanded, regex) = self.compiled.insert(entry);
        Ok((expanded.as_str(), &*regex))
    }
}

pub fn expand_date_tokens(pattern: &str, date: NaiveDate) -> String {
    pattern
        .replace("%year%", &date.format("%Y").to_string())
        .replace("%month%", &date.format("%m").to_string())
        .replace("%day%", &date.format("%d").to_string())
}

/// Checks an HTTP endpoint's status code and/or body.
#[derive(Debug, Default)]
pub struct HttpProbe {
    pub method: String,
    pub headers: HashMap<String, String>,
    pub expected_status_code: Option<u16>,
    pub expected_body: Option<String>,
    /// Verify TLS certificates.
    pub strict: bool,
    matcher: Option<BodyMatcher>,
    client: Option<reqwest::Client>,
}

impl HttpProbe {
    pub fn new(
        method: Option<String>,
        headers: HashMap<String, String>,
        expected_status_code: Option<u16>,
        expected_body: Option<String>,
        strict: bool,
    ) -> Self {
        Self {
            method: method.unwrap_or_default(),
            headers,
            expected_status_code: expected_status_code.filter(|c| *c > 0),
            expected_body: expected_body.filter(|b| !b.is_empty()),
            strict,
            matcher: None,
            client: None,
        }
    }

    fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        // a 302 is what the monitor wants to see, so do not follow it
        let policy = if self.expected_status_code == Some(302) {
            redirect::Policy::none()
        } else {
            redirect::Policy::default()
        };

        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(!self.strict)
            .redirect(policy)
            .build()
    }

    fn client(&mut self) -> Result<reqwest::Client, ProbeError> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let client = self
            .build_client()
            .map_err(|e| ProbeError::Config(e.to_string()))?;
        self.client = Some(client.clone());
        Ok(client)
    }
}

impl Check for HttpProbe {
    fn validate(&mut self) -> Vec<String> {
        let mut errs = Vec::new();

        if self.expected_body.is_none() && self.expected_status_code.is_none() {
            errs.push("Both 'expected_body' and 'expected_status_code' fields empty".to_string());
        }

        self.matcher = None;
        if let Some(pattern) = &self.expected_body {
            let mut matcher = BodyMatcher::new(pattern);
            match matcher.for_date(Local::now().date_naive()) {
                Ok(_) => self.matcher = Some(matcher),
                Err(e) => errs.push(format!("Regexp compilation failure: {}", e)),
            }
        }

        self.method = self.method.to_uppercase();
        if self.method.is_empty() {
            self.method = "GET".to_string();
        } else if !METHODS.contains(&self.method.as_str()) {
            errs.push(format!("Unsupported HTTP method: {}", self.method));
        }

        match self.build_client() {
            Ok(client) => self.client = Some(client),
            Err(e) => errs.push(format!("Could not build HTTP client: {}", e)),
        }

        errs
    }

    fn describe(&self) -> Vec<String> {
        let mut features = vec![
            format!("Method: {}", self.method),
            format!("Insecure: {}", !self.strict),
        ];
        if let Some(code) = self.expected_status_code {
            features.push(format!("Expected status code: {}", code));
        }
        if let Some(body) = &self.expected_body {
            features.push(format!("Expected body: {}", body));
        }
        if !self.headers.is_empty() {
            features.push(format!("Custom headers: {}", self.headers.len()));
        }
        features
    }

    async fn test(&mut self, target: ProbeTarget<'_>) -> Result<String, ProbeError> {
        let url = if target.address.starts_with("http://") || target.address.starts_with("https://") {
            target.address.to_string()
        } else {
            format!("http://{}", target.address)
        };

        let client = self.client()?;
        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|e| ProbeError::Config(format!("invalid method {}: {}", self.method, e)))?;

        tracing::debug!("InsecureSkipVerify: {}", !self.strict);

        let mut request = client.request(method, &url).timeout(target.timeout);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(target.timeout)
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if let Some(expected) = self.expected_status_code {
            if status != expected {
                return Err(ProbeError::UnexpectedStatus { expected, got: status });
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        if let Some(matcher) = &mut self.matcher {
            let (pattern, regex) = matcher
                .for_date(Local::now().date_naive())
                .map_err(|e| ProbeError::Config(e.to_string()))?;
            if !regex.is_match(&body) {
                return Err(ProbeError::UnexpectedBody {
                    body,
                    pattern: pattern.to_string(),
                });
            }
        }

        Ok(body)
    }
}
