use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(inner) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), inner),
        )),
        other => other,
    })
}

/// Parse and validate a config document
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;
    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .map(|cap| cap[1].to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         Set them before starting, or replace them in the config file with literal values",
        unexpanded_vars.join(", ")
    )))
}

fn expand_paths(config: &mut Config) {
    config.storage.path = expand_tilde(&config.storage.path);

    if let Some(batch) = config.batch.as_mut() {
        for source in batch.sources.values_mut() {
            source.path = expand_tilde(&source.path);
        }
    }

    if let Some(ObjectStoreConfig::Local { root }) = config.services.objects.as_mut() {
        *root = expand_tilde(root);
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    let tables = &config.storage.tables;
    for (field, name) in [
        ("cursors", &tables.cursors),
        ("analytics", &tables.analytics),
        ("visitors", &tables.visitors),
    ] {
        if name.trim().is_empty() {
            errors.push(format!("storage.tables.{} must not be empty", field));
        }
    }

    validate_url("services.vision.url", &config.services.vision.url, &mut errors);
    if let Some(video) = &config.services.video {
        validate_url("services.video.url", &video.url, &mut errors);
    }
    if let Some(ObjectStoreConfig::Http { url, .. }) = &config.services.objects {
        validate_url("services.objects.url", url, &mut errors);
    }

    if let Some(stream) = &config.stream {
        if stream.name.trim().is_empty() {
            errors.push("stream.name must not be empty".to_string());
        }
        if stream.list_limit == 0 {
            errors.push("stream.list_limit must be at least 1".to_string());
        }
        if stream.read_limit == 0 {
            errors.push("stream.read_limit must be at least 1".to_string());
        }
        validate_analysis("stream.analysis", &stream.analysis, &mut errors);
    }

    if let Some(processor) = &config.processor {
        if processor.name.trim().is_empty() {
            errors.push("processor.name must not be empty".to_string());
        }
        if processor.stream.trim().is_empty() {
            errors.push("processor.stream must not be empty".to_string());
        }
    }

    if let Some(batch) = &config.batch {
        validate_batch(config, batch, &mut errors);
    }

    if let Some(push) = &config.push {
        if push.chunk_size == 0 {
            errors.push("push.chunk_size must be at least 1".to_string());
        }
    }

    if let Some(web) = &config.web {
        if web.listen.parse::<SocketAddr>().is_err() {
            errors.push(format!("web.listen '{}' is not a socket address", web.listen));
        }
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(ConfigError::Validation(errors.remove(0))),
        _ => Err(ConfigError::ValidationList(errors)),
    }
}

fn validate_batch(config: &Config, batch: &BatchConfig, errors: &mut Vec<String>) {
    if batch.sources.is_empty() {
        errors.push("batch.sources must list at least one directory".to_string());
    }
    if batch.sample_interval.as_secs() == 0 {
        errors.push("batch.sample_interval must be at least 1s".to_string());
    }
    validate_analysis("batch.analysis", &batch.analysis, errors);

    for (name, source) in &batch.sources {
        if source.extensions().iter().any(|e| e.is_empty()) || source.extensions().is_empty() {
            errors.push(format!("batch.sources.{}: extensions must be non-empty", name));
        }
        if !source.objects.is_empty() && config.services.objects.is_none() {
            errors.push(format!(
                "batch.sources.{} lists objects but services.objects is not configured",
                name
            ));
        }
        let mut file_names = BTreeSet::new();
        for object in &source.objects {
            if object.bucket.is_empty() || object.key.is_empty() {
                errors.push(format!("batch.sources.{}: object bucket and key must be set", name));
            } else if !file_names.insert(object.file_name()) {
                errors.push(format!(
                    "batch.sources.{}: more than one object downloads to '{}'",
                    name,
                    object.file_name()
                ));
            }
        }
    }
}

fn validate_analysis(section: &str, analysis: &AnalysisConfig, errors: &mut Vec<String>) {
    if analysis.mode == AnalysisMode::FireAndPoll && analysis.max_polls == 0 {
        errors.push(format!("{}.max_polls must be at least 1", section));
    }
}

fn validate_url(field: &str, url: &str, errors: &mut Vec<String>) {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(format!("{} '{}' must be an http(s) URL", field, url));
    }
}
