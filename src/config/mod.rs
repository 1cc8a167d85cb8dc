use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-service configuration block from config.toml.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub base_url: Option<String>,
}

/// Top-level voxmap config file structure.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct VoxmapConfig {
    /// Root directory that holds per-project folders. Defaults to
    /// ~/.voxmap/projects when unset.
    pub data_directory: Option<String>,
    /// Default segment length in seconds for the segmentation stage.
    pub segment_length_secs: Option<f64>,
    /// Minimum speech-interval duration in seconds; shorter detections
    /// are discarded by the embedding stage.
    pub min_interval_secs: Option<f64>,
    /// Default dendrogram cut distance for the identity resolver.
    pub distance_threshold: Option<f64>,
    pub diarization: Option<ServiceConfig>,
    pub transcription: Option<ServiceConfig>,
}

pub const DEFAULT_SEGMENT_LENGTH_SECS: f64 = 600.0;
pub const DEFAULT_MIN_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 1.0;

impl VoxmapConfig {
    /// Load config from ~/.voxmap/config.toml. Returns default if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(VoxmapConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: VoxmapConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config.toml")?;
        Ok(config)
    }

    pub fn data_directory(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_directory {
            return Ok(PathBuf::from(dir));
        }
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".voxmap").join("projects"))
    }

    pub fn segment_length_secs(&self) -> f64 {
        self.segment_length_secs.unwrap_or(DEFAULT_SEGMENT_LENGTH_SECS)
    }

    pub fn min_interval_secs(&self) -> f64 {
        self.min_interval_secs.unwrap_or(DEFAULT_MIN_INTERVAL_SECS)
    }

    pub fn distance_threshold(&self) -> f64 {
        self.distance_threshold.unwrap_or(DEFAULT_DISTANCE_THRESHOLD)
    }

    /// Get service config by name.
    pub fn service_config(&self, service: &str) -> Option<&ServiceConfig> {
        match service {
            "diarization" => self.diarization.as_ref(),
            "transcription" => self.transcription.as_ref(),
            _ => None,
        }
    }

    /// Display config with secrets redacted.
    pub fn display_redacted(&self) -> String {
        let mut lines = Vec::new();
        if let Some(ref dir) = self.data_directory {
            lines.push(format!("data_directory = \"{}\"", dir));
        }
        if let Some(len) = self.segment_length_secs {
            lines.push(format!("segment_length_secs = {}", len));
        }
        if let Some(min) = self.min_interval_secs {
            lines.push(format!("min_interval_secs = {}", min));
        }
        if let Some(t) = self.distance_threshold {
            lines.push(format!("distance_threshold = {}", t));
        }
        if let Some(ref sc) = self.diarization {
            lines.push("[diarization]".to_string());
            display_service_config(&mut lines, sc);
        }
        if let Some(ref sc) = self.transcription {
            lines.push("[transcription]".to_string());
            display_service_config(&mut lines, sc);
        }
        if lines.is_empty() {
            lines.push("(defaults; no config file values set)".to_string());
        }
        lines.join("\n")
    }
}

fn display_service_config(lines: &mut Vec<String>, sc: &ServiceConfig) {
    if let Some(ref key) = sc.api_key {
        let redacted = if key.len() > 8 {
            format!("{}...{}", &key[..4], &key[key.len() - 4..])
        } else {
            "****".to_string()
        };
        lines.push(format!("  api_key = \"{}\"", redacted));
    }
    if let Some(ref cmd) = sc.api_key_command {
        lines.push(format!("  api_key_command = \"{}\"", cmd));
    }
    if let Some(ref url) = sc.base_url {
        lines.push(format!("  base_url = \"{}\"", url));
    }
}

/// Resolve a credential through the chain: CLI flag > env var > config key > config command.
pub fn resolve_credential(
    cli_flag: Option<&str>,
    env_var_name: &str,
    config: Option<&ServiceConfig>,
) -> Result<String> {
    // 1. CLI flag
    if let Some(key) = cli_flag {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    // 2. Environment variable
    if let Ok(val) = std::env::var(env_var_name) {
        if !val.is_empty() {
            return Ok(val);
        }
    }

    if let Some(sc) = config {
        // 3. Config file api_key
        if let Some(ref key) = sc.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }

        // 4. External command
        if let Some(ref cmd) = sc.api_key_command {
            if !cmd.is_empty() {
                let output = std::process::Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .output()
                    .with_context(|| format!("Failed to run api_key_command: {cmd}"))?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    bail!(
                        "api_key_command failed (exit {}): {}",
                        output.status.code().unwrap_or(-1),
                        stderr.trim()
                    );
                }

                let secret = String::from_utf8(output.stdout)
                    .context("api_key_command output is not valid UTF-8")?
                    .trim()
                    .to_string();

                if !secret.is_empty() {
                    return Ok(secret);
                }
            }
        }
    }

    bail!(
        "No API key found. Provide via --api-key, {} env var, or ~/.voxmap/config.toml",
        env_var_name
    );
}

/// Path to the config file: ~/.voxmap/config.toml
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".voxmap").join("config.toml"))
}

/// Default config template content.
pub fn default_config_template() -> &'static str {
    r#"# ~/.voxmap/config.toml
# Credential resolution order: CLI flag > env var > api_key > api_key_command

# data_directory = "/path/to/projects"
# segment_length_secs = 600
# min_interval_secs = 1.0
# distance_threshold = 1.0

[diarization]
# base_url = "http://localhost:8077"
# api_key = "your-diarization-api-key"
# api_key_command = "your-secrets-manager-command-here"

[transcription]
# base_url = "http://localhost:8078"
# api_key = "your-transcription-api-key"
# api_key_command = "your-secrets-manager-command-here"
"#
}

/// Create the default config file if it doesn't already exist.
pub fn init_config() -> Result<bool> {
    let path = config_path()?;
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, default_config_template())?;
    Ok(true)
}
