use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub repository: RepositoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Terminology repositories bootstrapped next to the resources repository
    pub tooling_ids: Vec<String>,
    /// Page size used when loading the descendants of a moved bundle
    pub descendant_batch_size: usize,
    pub default_page_size: usize,
    pub lock_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            tooling_ids: vec!["snomed".to_string(), "lcs".to_string()],
            descendant_batch_size: 5000,
            default_page_size: 50,
            lock_timeout_ms: 30_000,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional config file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        // e.g. TERMDB_SERVER__PORT=8080, TERMDB_REPOSITORY__TOOLING_IDS=snomed,loinc
        config = config.add_source(
            config::Environment::with_prefix("TERMDB")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("repository.tooling_ids")
                .try_parsing(true),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server_address(), "127.0.0.1:3001");
        assert_eq!(config.repository.descendant_batch_size, 5000);
        assert_eq!(config.repository.tooling_ids, vec!["snomed", "lcs"]);
    }
}
