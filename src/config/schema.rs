use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "backend": {
                "type": "object",
                "properties": {
                    "ws_url": { "type": "string", "pattern": "^wss?://" },
                    "api_url": { "type": "string", "pattern": "^https?://" },
                    "reconnect_delay_secs": { "type": "integer", "minimum": 1 },
                    "max_reconnect_attempts": { "type": "integer", "minimum": 1 },
                    "poll_interval_secs": { "type": "integer", "minimum": 1 }
                }
            },
            "pipeline": {
                "type": "object",
                "properties": {
                    "dedup_window_secs": { "type": "integer", "minimum": 1 },
                    "starvation_tick_secs": { "type": "integer", "minimum": 1 },
                    "starvation_threshold_secs": { "type": "integer", "minimum": 1 },
                    "render_window": { "type": "integer", "minimum": 1 }
                }
            },
            "analysis": {
                "type": "object",
                "properties": {
                    "symbol": { "type": "string", "minLength": 1 },
                    "agents": { "type": "array", "items": { "type": "string" } }
                }
            },
            "pricing": {
                "type": "object",
                "additionalProperties": { "$ref": "#/$defs/price" }
            },
            "history": {
                "type": "object",
                "properties": {
                    "db_path": { "type": "string" }
                }
            }
        },
        "$defs": {
            "price": {
                "type": "object",
                "required": ["prompt_per_1k", "completion_per_1k"],
                "properties": {
                    "prompt_per_1k": { "type": "number", "minimum": 0 },
                    "completion_per_1k": { "type": "number", "minimum": 0 }
                }
            }
        }
    })
});
