use executor_core::Options;
use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, ObjectFieldSelector};
use std::collections::BTreeMap;

pub const BUILDKIT_ENABLE: &str = "BUILDKIT_ENABLE";
pub const BUILDKIT_HIT_RATE: &str = "BUILDKIT_HIT_RATE";

/// Cluster config entries with upper-case keys are cluster-wide task envs.
pub fn is_env_key(key: &str) -> bool {
    key.starts_with(|c: char| c.is_ascii_uppercase())
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Cluster-wide envs in key order, without the buildkit switches.
pub fn cluster_envs(options: &Options) -> BTreeMap<&str, &str> {
    options
        .iter()
        .filter(|(key, _)| is_env_key(key) && key.as_str() != BUILDKIT_ENABLE)
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect()
}

pub fn env_var(name: impl Into<String>, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

pub fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: field_path.to_string(),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// `1`, `t`, `true` and `0`, `f`, `false`, in their usual capitalizations.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
