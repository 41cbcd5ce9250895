use crate::core::get_config_dir;
use crate::core::select::OnlyUse;
use crate::core::smi::{NvidiaSmi, DEFAULT_ARGS, DEFAULT_COMMAND};
use crate::utils::parsers::parse_gpu_indices;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

#[derive(Deserialize, Debug, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub smi: SmiConfig,
    /// Restrict selection to these GPU indices unless `--only-use` is given (None = all GPUs)
    ///
    /// Accepts a list (`[0, 1]`), a single index, or an index string such as `"0-3"`.
    #[serde(default, deserialize_with = "deserialize_gpus")]
    pub gpus: Option<Vec<u32>>,
}

/// How to invoke the diagnostics tool.
#[derive(Deserialize, Debug, Clone)]
pub struct SmiConfig {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

fn default_command() -> String {
    DEFAULT_COMMAND.to_string()
}

fn default_args() -> Vec<String> {
    DEFAULT_ARGS.iter().map(|a| a.to_string()).collect()
}

/// A `gpus` entry: environment values arrive as strings or integers
/// depending on whether they look numeric.
#[derive(Deserialize)]
#[serde(untagged)]
enum GpuEntry {
    Index(u32),
    Spec(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GpuList {
    Many(Vec<GpuEntry>),
    One(GpuEntry),
}

fn deserialize_gpus<'de, D>(deserializer: D) -> Result<Option<Vec<u32>>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Option::<GpuList>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(GpuList::Many(entries)) => entries,
        Some(GpuList::One(entry)) => vec![entry],
    };

    let mut gpus = Vec::new();
    for entry in entries {
        match entry {
            GpuEntry::Index(index) => gpus.push(index),
            GpuEntry::Spec(spec) => {
                let indices =
                    parse_gpu_indices(&spec).map_err(|e| D::Error::custom(format!("{e:#}")))?;
                gpus.extend(indices);
            }
        }
    }
    gpus.sort_unstable();
    gpus.dedup();

    Ok(Some(gpus))
}

impl Default for SmiConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
        }
    }
}

impl Config {
    pub fn nvidia_smi(&self) -> NvidiaSmi {
        NvidiaSmi::new(self.smi.command.clone(), self.smi.args.clone())
    }

    pub fn only_use(&self) -> Option<OnlyUse> {
        self.gpus
            .as_ref()
            .map(|gpus| gpus.iter().copied().collect())
    }
}

pub fn load_config(config_path: Option<&PathBuf>) -> Result<Config, config::ConfigError> {
    load_config_with_env(config_path, None)
}

/// Like [`load_config`], but reads `FREEGPUS_*` variables from `env` instead of
/// the process environment when given.
pub fn load_config_with_env(
    config_path: Option<&PathBuf>,
    env: Option<config::Map<String, String>>,
) -> Result<Config, config::ConfigError> {
    let mut config_vec = vec![];

    // User-provided config file
    if let Some(config_path) = config_path {
        if config_path.exists() {
            config_vec.push(config_path.clone());
        } else {
            tracing::warn!("Config file {config_path:?} not found.");
        }
    }

    // Default config file
    if let Ok(default_config_path) = get_config_dir().map(|d| d.join("freegpus.toml")) {
        if default_config_path.exists() {
            config_vec.push(default_config_path);
        }
    }

    tracing::debug!(files = ?config_vec, "Loading configuration");

    let settings = config::Config::builder();
    let settings = config_vec.iter().fold(settings, |s, path| {
        s.add_source(config::File::from(path.as_path()))
    });

    settings
        .add_source(
            config::Environment::with_prefix("FREEGPUS")
                .source(env)
                .separator("_")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("gpus")
                .with_list_parse_key("smi.args"),
        )
        .build()?
        .try_deserialize()
}
