use crate::errors::ConfigError;
use crate::logger::{LogFacade, Logger};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const PARAM_PORT: &str = "port";
pub const PARAM_CERT_FILE: &str = "certFile";
pub const PARAM_CERT_KEY_FILE: &str = "certKeyFile";

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_HTTPS_PORT: u16 = 443;

/// HTTP transport config.
///
/// TLS is enabled when both `cert_file` and `cert_key_file` are set.
#[derive(Debug, Clone, Builder)]
pub struct HttpConfig {
    #[builder(default, setter(strip_option))]
    pub(crate) port: Option<u16>,
    #[builder(default, setter(into, strip_option))]
    pub(crate) cert_file: Option<PathBuf>,
    #[builder(default, setter(into, strip_option))]
    pub(crate) cert_key_file: Option<PathBuf>,
    /// Capacity of each endpoint inbox.
    #[builder(default = "1")]
    pub(crate) inbox_size: usize,
    #[builder(default = "Duration::from_millis(1000)")]
    pub(crate) connect_timeout: Duration,
    #[builder(default = "Arc::new(LogFacade)")]
    pub(crate) logger: Arc<dyn Logger>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            port: None,
            cert_file: None,
            cert_key_file: None,
            inbox_size: 1,
            connect_timeout: Duration::from_millis(1000),
            logger: Arc::new(LogFacade),
        }
    }
}

impl HttpConfig {
    /// Plain HTTP config listening on `port`.
    pub fn with_port(port: u16) -> HttpConfig {
        HttpConfig {
            port: Some(port),
            ..HttpConfig::default()
        }
    }

    /// Builds config from string parameters: `port`, `certFile` and `certKeyFile`.
    pub fn from_params(params: &HashMap<String, String>) -> Result<HttpConfig, ConfigError> {
        let mut builder = HttpConfigBuilder::default();
        if let Some(port) = params.get(PARAM_PORT) {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
            builder.port(port);
        }
        if let Some(cert_file) = params.get(PARAM_CERT_FILE) {
            builder.cert_file(cert_file);
        }
        if let Some(cert_key_file) = params.get(PARAM_CERT_KEY_FILE) {
            builder.cert_key_file(cert_key_file);
        }
        let config = builder.build()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cert_file.is_some() != self.cert_key_file.is_some() {
            return Err(ConfigError::IncompleteTls);
        }
        Ok(())
    }

    pub fn is_tls(&self) -> bool {
        self.cert_file.is_some() && self.cert_key_file.is_some()
    }

    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.is_tls() => DEFAULT_HTTPS_PORT,
            None => DEFAULT_HTTP_PORT,
        }
    }

    /// Port assumed for a service authority that carries none.
    pub(crate) fn default_remote_port(&self) -> u16 {
        if self.is_tls() {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_HTTP_PORT
        }
    }
}

impl From<HttpConfigBuilderError> for ConfigError {
    fn from(err: HttpConfigBuilderError) -> Self {
        ConfigError::Error(err.to_string())
    }
}
