pub mod app;
pub mod draw;
pub mod edit;
pub mod panes;

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;

    use crate::config::{ApiConfig, Config, Keys, LoggingConfig, UiConfig};

    pub fn test_config() -> Config {
        Config {
            config_path: PathBuf::from("/tmp/config.toml"),
            api: ApiConfig::new("http://localhost", "t"),
            logging: LoggingConfig {
                file: PathBuf::from("/tmp/keapdesk.log"),
                level: "info".into(),
            },
            keys: Keys::default(),
            ui: UiConfig::default(),
        }
    }
}
