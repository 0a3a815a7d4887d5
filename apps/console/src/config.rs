use std::{collections::HashMap, fs, path::Path};

use firebase_rest::{FirebaseConfig, DEFAULT_AUTH_URL, DEFAULT_STORAGE_URL};
use tracing::warn;
use upload_store::{StoragePathPolicy, StoreOptions, DEFAULT_UPLOADS_COLLECTION};

const SETTING_KEYS: [&str; 7] = [
    "api_key",
    "database_url",
    "storage_bucket",
    "storage_url",
    "auth_url",
    "uploads_collection",
    "storage_path_policy",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub database_url: String,
    pub storage_bucket: String,
    pub storage_url: String,
    pub auth_url: String,
    pub uploads_collection: String,
    pub storage_path_policy: StoragePathPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            database_url: "http://127.0.0.1:9000".into(),
            storage_bucket: "demo-uploads.appspot.com".into(),
            storage_url: DEFAULT_STORAGE_URL.into(),
            auth_url: DEFAULT_AUTH_URL.into(),
            uploads_collection: DEFAULT_UPLOADS_COLLECTION.into(),
            storage_path_policy: StoragePathPolicy::default(),
        }
    }
}

impl Settings {
    pub fn firebase_config(&self) -> FirebaseConfig {
        FirebaseConfig {
            api_key: self.api_key.clone(),
            database_url: self.database_url.clone(),
            storage_bucket: self.storage_bucket.clone(),
            storage_url: self.storage_url.clone(),
            auth_url: self.auth_url.clone(),
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            uploads_collection: self.uploads_collection.clone(),
            storage_path_policy: self.storage_path_policy,
        }
    }
}

/// Defaults, then the TOML file at `path` if it exists, then `FIREBASE_*` and
/// `APP__*` environment variables (the latter win).
pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                for (key, value) in &file_cfg {
                    apply_value(&mut settings, key, value);
                }
            }
            Err(err) => warn!("config: ignoring {}: {err}", path.display()),
        }
    }

    apply_env(&mut settings, |name| std::env::var(name).ok());
    normalize_settings(&mut settings);
    settings
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    for key in SETTING_KEYS {
        let upper = key.to_ascii_uppercase();
        if let Some(v) = lookup(&format!("FIREBASE_{upper}")) {
            apply_value(settings, key, &v);
        }
        if let Some(v) = lookup(&format!("APP__{upper}")) {
            apply_value(settings, key, &v);
        }
    }
}

fn apply_value(settings: &mut Settings, key: &str, value: &str) {
    match key {
        "api_key" => settings.api_key = value.to_string(),
        "database_url" => settings.database_url = value.to_string(),
        "storage_bucket" => settings.storage_bucket = value.to_string(),
        "storage_url" => settings.storage_url = value.to_string(),
        "auth_url" => settings.auth_url = value.to_string(),
        "uploads_collection" => settings.uploads_collection = value.trim_matches('/').to_string(),
        "storage_path_policy" => match value.parse() {
            Ok(policy) => settings.storage_path_policy = policy,
            Err(err) => warn!("config: keeping storage_path_policy: {err}"),
        },
        other => warn!("config: unknown setting {other}"),
    }
}

fn normalize_settings(settings: &mut Settings) {
    let defaults = Settings::default();
    settings.database_url = normalize_base_url(&settings.database_url, &defaults.database_url);
    settings.storage_url = normalize_base_url(&settings.storage_url, &defaults.storage_url);
    settings.auth_url = normalize_base_url(&settings.auth_url, &defaults.auth_url);
    if settings.uploads_collection.is_empty() {
        settings.uploads_collection = defaults.uploads_collection;
    }
}

fn normalize_base_url(raw: &str, fallback: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');

    if raw.is_empty() {
        return fallback.to_string();
    }

    if raw.contains("://") {
        return raw.to_string();
    }

    format!("https://{raw}")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
