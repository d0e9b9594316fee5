use std::{env, time::Duration};

/// Settings applied by the bridge to every connection and statement.
///
/// Values not set explicitly are read from the environment by [`Config::from_env`]:
///
/// | Variable | Meaning | Default |
/// |----------|---------|---------|
/// | `ODBRIDGE_LOGIN_TIMEOUT` | login timeout in seconds | driver default |
/// | `ODBRIDGE_QUERY_TIMEOUT` | query timeout in seconds | none |
/// | `ODBRIDGE_DESCRIBE_PARAMETERS` | ask the driver for parameter types | `true` |
/// | `ODBRIDGE_SCROLLABLE` | request scrollable cursors | `false` |
/// | `ODBRIDGE_TEXT_CHUNK` | bytes read per `SQLGetData` call | `4096` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub login_timeout: Option<Duration>,
    pub query_timeout: Option<Duration>,
    pub describe_parameters: bool,
    pub scrollable: bool,
    pub text_chunk: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            login_timeout: None,
            query_timeout: None,
            describe_parameters: true,
            scrollable: false,
            text_chunk: 4096,
        }
    }
}

impl Config {
    pub const LOGIN_TIMEOUT: &'static str = "ODBRIDGE_LOGIN_TIMEOUT";
    pub const QUERY_TIMEOUT: &'static str = "ODBRIDGE_QUERY_TIMEOUT";
    pub const DESCRIBE_PARAMETERS: &'static str = "ODBRIDGE_DESCRIBE_PARAMETERS";
    pub const SCROLLABLE: &'static str = "ODBRIDGE_SCROLLABLE";
    pub const TEXT_CHUNK: &'static str = "ODBRIDGE_TEXT_CHUNK";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`Config::from_env`], reading the variables through `lookup`.
    /// Invalid values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = seconds(&lookup, Self::LOGIN_TIMEOUT) {
            config.login_timeout = Some(v);
        }
        if let Some(v) = seconds(&lookup, Self::QUERY_TIMEOUT) {
            config.query_timeout = Some(v);
        }
        if let Some(v) = flag(&lookup, Self::DESCRIBE_PARAMETERS) {
            config.describe_parameters = v;
        }
        if let Some(v) = flag(&lookup, Self::SCROLLABLE) {
            config.scrollable = v;
        }
        if let Some(v) = lookup(Self::TEXT_CHUNK) {
            match v.trim().parse::<usize>() {
                Ok(v) if v > 0 => config.text_chunk = v,
                _ => log::warn!(
                    "Ignoring {}={:?}, expected a positive number of bytes",
                    Self::TEXT_CHUNK,
                    v
                ),
            }
        }
        config
    }

    pub fn with_login_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_describe_parameters(mut self, describe: bool) -> Self {
        self.describe_parameters = describe;
        self
    }

    pub fn with_scrollable(mut self, scrollable: bool) -> Self {
        self.scrollable = scrollable;
        self
    }

    pub fn with_text_chunk(mut self, bytes: usize) -> Self {
        self.text_chunk = bytes.max(1);
        self
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let value = lookup(key)?;
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(Duration::from_secs_f64(v)),
        _ => {
            log::warn!("Ignoring {}={:?}, expected seconds", key, value);
            None
        }
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let value = lookup(key)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            log::warn!("Ignoring {}={:?}, expected a boolean", key, value);
            None
        }
    }
}
