// src/utils/env.rs

use log::{info, warn};
use std::path::Path;

/// Candidate locations for a `.env` file, checked in order.
const ENV_PATHS: [&str; 3] = [".env", ".env.local", "../.env"];

/// Loads the first `.env` file found. Variables already set in the process
/// environment are never overridden.
pub fn load_env() {
    let mut loaded_env = false;
    for path in ENV_PATHS.iter() {
        if !Path::new(path).exists() {
            continue;
        }
        match dotenv::from_path(path) {
            Ok(()) => {
                info!("Loaded environment variables from {}", path);
                loaded_env = true;
                break;
            }
            Err(e) => warn!("Failed to load environment from {}: {}", path, e),
        }
    }
    if !loaded_env {
        info!("No .env file found, using environment variables from system");
    }
}

/// Reads an environment variable and parses it, falling back to `default`
/// when the variable is unset or unparsable.
pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparsable value '{}' for {}", raw, key);
                default
            }
        },
        Err(_) => default,
    }
}

/// Like [`env_or`] but yields `None` when the variable is unset.
pub fn env_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable value '{}' for {}", raw, key);
            None
        }
    }
}
