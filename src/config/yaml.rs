//! YAML configuration file loading.
//!
//! Every field is optional; values present in the file override whatever the
//! environment produced.

use std::path::PathBuf;

use serde::Deserialize;

use super::{ConfigError, ServerConfig, TlsConfig};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlConfig {
    #[serde(default)]
    server: YamlServer,
    #[serde(default)]
    live: YamlService,
    #[serde(default)]
    completion: YamlService,
    #[serde(default)]
    assistant: YamlAssistant,
    #[serde(default)]
    security: YamlSecurity,
    #[serde(default)]
    timeouts: YamlTimeouts,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlServer {
    host: Option<String>,
    port: Option<u16>,
    tls: Option<YamlTls>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlTls {
    cert_path: PathBuf,
    key_path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlService {
    url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlAssistant {
    instructions: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlSecurity {
    cors_allowed_origins: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlTimeouts {
    idle_seconds: Option<u64>,
    connect_seconds: Option<u64>,
}

/// Overlay the YAML file at `path` onto `base`.
pub(super) fn merge_from_file(
    mut base: ServerConfig,
    path: &PathBuf,
) -> Result<ServerConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let yaml: YamlConfig =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

    if let Some(host) = yaml.server.host {
        base.host = host;
    }
    if let Some(port) = yaml.server.port {
        base.port = port;
    }
    if let Some(tls) = yaml.server.tls {
        base.tls = Some(TlsConfig {
            cert_path: tls.cert_path,
            key_path: tls.key_path,
        });
    }

    if let Some(url) = yaml.live.url {
        base.live_api_url = url;
    }
    if let Some(key) = yaml.live.api_key {
        base.live_api_key = Some(key);
    }
    if let Some(model) = yaml.live.model {
        base.live_model = model;
    }

    if let Some(url) = yaml.completion.url {
        base.completion_api_url = url;
    }
    if let Some(key) = yaml.completion.api_key {
        base.completion_api_key = Some(key);
    }
    if let Some(model) = yaml.completion.model {
        base.completion_model = model;
    }

    if let Some(instructions) = yaml.assistant.instructions {
        base.assistant_instructions = Some(instructions);
    }
    if let Some(origins) = yaml.security.cors_allowed_origins {
        base.cors_allowed_origins = Some(origins);
    }
    if let Some(idle) = yaml.timeouts.idle_seconds {
        base.idle_timeout_seconds = idle;
    }
    if let Some(connect) = yaml.timeouts.connect_seconds {
        base.connect_timeout_seconds = connect;
    }

    Ok(base)
}
