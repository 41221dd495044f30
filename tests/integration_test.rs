use citeflow::config::{Config, RetrievalSettings};

#[test]
fn test_config_validation_rejects_non_http_url() {
    let config = Config {
        api_url: "ftp://127.0.0.1:8000/api".to_string(),
        retrieval: RetrievalSettings::default(),
    };

    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_rejects_out_of_range_top_k() {
    let config = Config {
        api_url: "http://127.0.0.1:8000/api".to_string(),
        retrieval: RetrievalSettings {
            top_k: 0,
            ..RetrievalSettings::default()
        },
    };

    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_rejects_out_of_range_temperature() {
    let config = Config {
        api_url: "http://127.0.0.1:8000/api".to_string(),
        retrieval: RetrievalSettings {
            temperature: 1.5,
            ..RetrievalSettings::default()
        },
    };

    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_accepts_defaults() {
    let config = Config {
        api_url: "http://127.0.0.1:8000/api".to_string(),
        retrieval: RetrievalSettings::default(),
    };

    assert!(config.validate().is_ok());
}
