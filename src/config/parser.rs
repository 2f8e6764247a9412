use std::path::Path;
use crate::agents::registry::AgentRole;
use crate::errors::MarketdeskError;
use super::types::MarketdeskConfig;
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

pub async fn parse_config(path: &Path) -> Result<MarketdeskConfig, MarketdeskError> {
    if !path.exists() {
        return Err(MarketdeskError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(MarketdeskError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let (config, warnings) = check_config(&content)?;
    for msg in &warnings {
        warn!(validation_error = %msg, "Config schema warning");
    }
    Ok(config)
}

/// Parse and validate config text. Schema findings are advisory and come
/// back as warnings; semantic conflicts are errors.
pub fn check_config(content: &str) -> Result<(MarketdeskConfig, Vec<String>), MarketdeskError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    // an empty file is a valid, all-defaults config
    if yaml.is_null() {
        return Ok((MarketdeskConfig::default(), Vec::new()));
    }

    let warnings = validate_schema(&yaml)?;
    let config: MarketdeskConfig = serde_yaml::from_value(yaml)?;
    validate_conflicts(&config)?;

    Ok((config, warnings))
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<Vec<String>, MarketdeskError> {
    let json_str = serde_json::to_string(yaml)
        .map_err(|e| MarketdeskError::Config(format!("Config conversion error: {}", e)))?;
    let json_value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| MarketdeskError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| MarketdeskError::Config(format!("Schema compilation error: {}", e)))?;

    let messages = match compiled.validate(&json_value) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect(),
    };
    Ok(messages)
}

/// Detect semantic conflicts in the parsed configuration.
fn validate_conflicts(config: &MarketdeskConfig) -> Result<(), MarketdeskError> {
    if let Some(agents) = config.analysis.as_ref().and_then(|a| a.agents.as_ref()) {
        let unknown: Vec<&str> = agents
            .iter()
            .filter(|name| AgentRole::normalize(name).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(MarketdeskError::Config(format!(
                "Unknown agents in analysis.agents: {}",
                unknown.join(", ")
            )));
        }
        if agents.is_empty() {
            warn!("analysis.agents is empty; the default team will be used");
        }
    }

    if let Some(pipeline) = &config.pipeline {
        if let (Some(tick), Some(threshold)) = (pipeline.starvation_tick_secs, pipeline.starvation_threshold_secs) {
            if tick > threshold {
                return Err(MarketdeskError::Config(format!(
                    "pipeline.starvation_tick_secs ({}) exceeds starvation_threshold_secs ({})",
                    tick, threshold
                )));
            }
        }
        if pipeline.render_window == Some(0) {
            return Err(MarketdeskError::Config("pipeline.render_window must be at least 1".into()));
        }
    }

    if let Some(backend) = &config.backend {
        if backend.max_reconnect_attempts == Some(0) {
            return Err(MarketdeskError::Config(
                "backend.max_reconnect_attempts must be at least 1; omit it to retry forever".into(),
            ));
        }
    }

    Ok(())
}
