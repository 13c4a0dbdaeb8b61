//! Configuration module for cachet-monitor.
//!
//! Agent settings come from environment variables; the API credentials and
//! the monitors come from a TOML file.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::monitor::{
    MetricIds, Monitor, ShellHooks, Templates, Threshold, Thresholds, DEFAULT_TIME_FORMAT,
};
use crate::probe::{DnsProbe, HttpProbe, MockProbe, Probe};

const DEFAULT_SYSTEM_NAME: &str = "cachet-monitor";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration:\n - {}", .0.join("\n - "))]
    Invalid(Vec<String>),
}

/// Agent settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Path to the monitor file (default: "cachet-monitor.toml")
    pub config_path: PathBuf,
    /// Overrides the system name shown in incidents
    pub system_name: Option<String>,
    /// Tick once as soon as a clock starts
    pub immediate: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("cachet-monitor.toml"),
            system_name: None,
            immediate: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CACHET_MONITOR_CONFIG`: monitor file path (default: "cachet-monitor.toml")
    /// - `CACHET_MONITOR_NAME`: system name override
    /// - `CACHET_MONITOR_IMMEDIATE`: `1` or `true` to tick on start
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(path) = lookup("CACHET_MONITOR_CONFIG").filter(|p| !p.is_empty()) {
            cfg.config_path = PathBuf::from(path);
        }

        cfg.system_name = lookup("CACHET_MONITOR_NAME").filter(|n| !n.is_empty());

        if let Some(flag) = lookup("CACHET_MONITOR_IMMEDIATE") {
            cfg.immediate = matches!(flag.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }

        cfg
    }
}

/// Status page API credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub url: String,
    pub token: String,
    #[serde(default)]
    pub insecure: bool,
}

/// The monitor file.
#[derive(Debug, Deserialize)]
pub struct MonitorFile {
    pub api: ApiConfig,
    #[serde(default)]
    pub system_name: Option<String>,
    #[serde(default)]
    pub immediate: bool,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,
}

fn default_date_format() -> String {
    DEFAULT_TIME_FORMAT.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    #[default]
    Http,
    Dns,
    Mock,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub warning: Option<Threshold>,
    #[serde(default)]
    pub critical: Option<Threshold>,
}

/// One `[[monitors]]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub target: String,
    #[serde(rename = "type", default)]
    pub kind: MonitorKind,
    #[serde(default)]
    pub strict: bool,
    /// Seconds between ticks
    #[serde(default)]
    pub interval: u64,
    /// Probe timeout in seconds
    #[serde(default)]
    pub timeout: u64,
    pub component_id: Option<u32>,
    pub metric_id: Option<u32>,
    #[serde(default)]
    pub history_size: usize,
    #[serde(default)]
    pub threshold: ThresholdConfig,
    #[serde(default)]
    pub metrics: MetricIds,
    #[serde(default)]
    pub shellhook: ShellHooks,
    #[serde(default)]
    pub template: Templates,

    pub method: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub expected_status_code: Option<u16>,
    pub expected_body: Option<String>,

    pub dns: Option<String>,
    pub question: Option<String>,
}

impl MonitorConfig {
    pub fn into_monitor(self, system_name: &str, time_format: &str) -> Monitor {
        let probe = match self.kind {
            MonitorKind::Http => Probe::Http(HttpProbe::new(
                self.method,
                self.headers,
                self.expected_status_code,
                self.expected_body,
                self.strict,
            )),
            MonitorKind::Dns => Probe::Dns(DnsProbe::new(self.dns, self.question)),
            MonitorKind::Mock => Probe::Mock(MockProbe),
        };

        let mut monitor = Monitor::new(self.name, self.target, probe);
        monitor.interval = Duration::from_secs(self.interval);
        monitor.timeout = Duration::from_secs(self.timeout);
        monitor.component_id = self.component_id.filter(|id| *id > 0);
        monitor.metric_id = self.metric_id.filter(|id| *id > 0);
        monitor.metrics = self.metrics;
        monitor.hooks = self.shellhook;
        monitor.templates = self.template;
        monitor.thresholds = Thresholds {
            warning: self.threshold.warning.unwrap_or_default(),
            critical: self.threshold.critical,
            history_size: self.history_size,
        };
        monitor.system_name = system_name.to_string();
        monitor.time_format = time_format.to_string();
        monitor
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<MonitorFile, ConfigError> {
    let path = path.as_ref();
    let path_str = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path_str.clone(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path_str,
        source,
    })
}

impl MonitorFile {
    /// System name shown in incidents: the environment override, then the
    /// file, then the host name.
    pub fn resolve_system_name(&self, agent: &AgentConfig) -> String {
        agent
            .system_name
            .clone()
            .or_else(|| self.system_name.clone().filter(|n| !n.is_empty()))
            .unwrap_or_else(host_name)
    }

    /// Build and validate every monitor, reporting all errors at once.
    pub fn build_monitors(self, system_name: &str) -> Result<Vec<Monitor>, ConfigError> {
        let mut errs = Vec::new();
        let mut monitors = Vec::with_capacity(self.monitors.len());

        if self.monitors.is_empty() {
            errs.push("no monitors configured".to_string());
        }

        for (index, cfg) in self.monitors.into_iter().enumerate() {
            let mut monitor = cfg.into_monitor(system_name, &self.date_format);
            let label = if monitor.name.is_empty() {
                format!("Monitor #{}", index)
            } else {
                format!("Monitor #{} ({})", index, monitor.name)
            };

            for err in monitor.validate() {
                errs.push(format!("{}: {}", label, err));
            }
            if !monitor.name.is_empty() && monitors.iter().any(|m: &Monitor| m.name == monitor.name) {
                errs.push(format!("{}: duplicate monitor name", label));
            }
            monitors.push(monitor);
        }

        if errs.is_empty() {
            Ok(monitors)
        } else {
            Err(ConfigError::Invalid(errs))
        }
    }
}

fn host_name() -> String {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_SYSTEM_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio_test::assert_ok;

    const SAMPLE: &str = r#"
system_name = "probe-1"
immediate = true

[api]
url = "https://status.example.com/api/v1"
token = "secret"

[[monitors]]
name = "website"
target = "https://example.com"
component_id = 1
interval = 30
timeout = 5
expected_status_code = 200
headers = { Authorization = "Basic abc" }

[monitors.threshold]
warning = { percentage = 40.0 }
critical = { count = 3 }

[monitors.metrics]
response_time = [4]
availability = [5, 6]

[monitors.shellhook]
on_failure = "/usr/local/bin/page"

[monitors.template.investigating]
subject = "{{ monitor.name }} is down"

[[monitors]]
name = "resolver"
type = "dns"
target = "example.com"
dns = "127.0.0.1:5353"
question = "aaaa"
metric_id = 7
history_size = 4

[[monitors]]
name = "canary"
type = "mock"
target = "nothing"
metric_id = 8
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.config_path, PathBuf::from("cachet-monitor.toml"));
        assert_eq!(cfg.system_name, None);
        assert!(!cfg.immediate);
    }

    #[test]
    fn test_agent_config_from_env() {
        let vars: HashMap<&str, &str> = [
            ("CACHET_MONITOR_CONFIG", "/etc/cachet/monitors.toml"),
            ("CACHET_MONITOR_NAME", "edge-2"),
            ("CACHET_MONITOR_IMMEDIATE", "TRUE"),
        ]
        .into_iter()
        .collect();

        let cfg = AgentConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.config_path, PathBuf::from("/etc/cachet/monitors.toml"));
        assert_eq!(cfg.system_name.as_deref(), Some("edge-2"));
        assert!(cfg.immediate);

        let cfg = AgentConfig::from_lookup(|_| Some(String::new()));
        assert_eq!(cfg.config_path, PathBuf::from("cachet-monitor.toml"));
        assert!(!cfg.immediate);
    }

    #[test]
    fn test_load_and_build() {
        let file = write_config(SAMPLE);
        let config = assert_ok!(load_config(file.path()));

        assert_eq!(config.api.token, "secret");
        assert!(config.immediate);
        assert_eq!(config.date_format, DEFAULT_TIME_FORMAT);
        assert_eq!(config.resolve_system_name(&AgentConfig::default()), "probe-1");

        let monitors = assert_ok!(config.build_monitors("probe-1"));
        assert_eq!(monitors.len(), 3);

        let web = &monitors[0];
        assert_eq!(web.probe.kind(), "http");
        assert_eq!(web.interval, Duration::from_secs(30));
        assert_eq!(web.timeout, Duration::from_secs(5));
        assert_eq!(web.component_id, Some(1));
        assert_eq!(web.thresholds.warning, Threshold::Percentage(40.0));
        assert_eq!(web.thresholds.critical, Some(Threshold::Count(3)));
        assert_eq!(web.metrics.availability, vec![5, 6]);
        assert_eq!(web.hooks.on_failure.as_deref(), Some("/usr/local/bin/page"));
        assert_eq!(web.templates.investigating.subject, "{{ monitor.name }} is down");
        assert!(web.templates.fixed.message.contains("Resolved"));
        assert_eq!(web.system_name, "probe-1");

        let dns = &monitors[1];
        assert_eq!(dns.probe.kind(), "dns");
        assert_eq!(dns.interval, Duration::from_secs(60));
        assert_eq!(dns.timeout, Duration::from_secs(1));
        assert_eq!(dns.history().capacity(), 4);

        assert_eq!(monitors[2].probe.kind(), "mock");
    }

    #[test]
    fn test_system_name_override() {
        let file = write_config(SAMPLE);
        let config = load_config(file.path()).unwrap();
        let agent = AgentConfig {
            system_name: Some("override".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_system_name(&agent), "override");
    }

    #[test]
    fn test_all_errors_reported() {
        let file = write_config(
            r#"
[api]
url = "http://localhost/api/v1"
token = "t"

[[monitors]]
target = "https://example.com"
interval = 1
timeout = 5
expected_status_code = 200

[[monitors]]
name = "resolver"
type = "dns"
target = "example.com"
question = "SRV"
component_id = 3

[[monitors]]
name = "resolver"
type = "mock"
target = "x"
metric_id = 1
"#,
        );
        let config = load_config(file.path()).unwrap();

        match config.build_monitors("probe-1") {
            Err(ConfigError::Invalid(errs)) => {
                assert_eq!(
                    errs,
                    vec![
                        "Monitor #0: Name is required".to_string(),
                        "Monitor #0: Timeout greater than interval".to_string(),
                        "Monitor #0: component_id & metric_id are unset".to_string(),
                        "Monitor #1 (resolver): Unsupported DNS question type: SRV".to_string(),
                        "Monitor #2 (resolver): duplicate monitor name".to_string(),
                    ]
                );
            }
            other => panic!("expected validation errors, got {:?}", other.map(|m| m.len())),
        }
    }

    #[test]
    fn test_empty_monitor_list_rejected() {
        let file = write_config("[api]\nurl = \"http://x\"\ntoken = \"t\"\n");
        let config = load_config(file.path()).unwrap();
        assert!(matches!(config.build_monitors("x"), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(load_config(&missing), Err(ConfigError::Read { .. })));

        let file = write_config("[api\nurl=");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_example_file_is_valid() {
        let file = write_config(include_str!("../cachet-monitor.example.toml"));
        let config = load_config(file.path()).unwrap();
        let monitors = assert_ok!(config.build_monitors("edge-probe-1"));
        let kinds: Vec<&str> = monitors.iter().map(|m| m.probe.kind()).collect();
        assert_eq!(kinds, vec!["http", "dns", "mock"]);
    }

    #[test]
    fn test_invalid_error_display() {
        let err = ConfigError::Invalid(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "invalid configuration:\n - a\n - b");
    }
}
