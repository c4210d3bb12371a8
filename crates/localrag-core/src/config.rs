//! Configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates sections, e.g. `APP_CHUNKING__CHUNK_SIZE=256`) and extracts
//! the typed [`Settings`] consumed by the chunker, embedder and index.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Soft upper bound on chunk length, in characters of the joined chunk
    /// text: the single spaces between sentences count toward it. Two
    /// 15-character sentences therefore need `chunk_size >= 31` to share a chunk.
    pub chunk_size: usize,
    /// Trailing characters (rounded down to whole sentences) repeated at the start of the next chunk.
    pub overlap_chars: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 512, overlap_chars: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub max_tokens: usize,
    pub batch_size: usize,
    pub use_fake: bool,
    pub fake_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, max_tokens: 512, batch_size: 32, use_fake: false, fake_dim: 768 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub dimension: usize,
    /// Base path of the persisted artifacts (`<path>.meta.json` + vectors file).
    pub path: String,
    pub autosave: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { dimension: 768, path: "data/vector_store".to_string(), autosave: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be > 0".into()));
        }
        if self.embedding.max_tokens == 0 {
            return Err(Error::Config("embedding.max_tokens must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::Config("embedding.batch_size must be > 0".into()));
        }
        if self.index.dimension == 0 {
            return Err(Error::Config("index.dimension must be > 0".into()));
        }
        Ok(())
    }
}

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate_for_env()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment, env_name: "custom".to_string() }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Config(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::Config(format!("Failed to extract settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn env_name(&self) -> &str { &self.env_name }

    fn validate_for_env(&self) -> Result<()> {
        let settings = self.settings()?;
        match self.env_name.as_str() {
            "prod" | "production" if settings.embedding.use_fake => {
                Err(Error::Config("fake embeddings are not allowed in production".into()))
            }
            _ => Ok(()),
        }
    }
}

/// `$VAR`/`${VAR}` then a leading `~` expanded. If any variable is unset the
/// string is kept as written apart from the `~`.
pub fn expand_path(input: impl AsRef<str>) -> PathBuf {
    let raw = input.as_ref();
    let with_vars = shellexpand::env(raw).map(Cow::into_owned).unwrap_or_else(|_| raw.to_owned());
    PathBuf::from(shellexpand::tilde(&with_vars).into_owned())
}

/// [`expand_path`], joined onto `base` unless already absolute.
pub fn resolve_with_base(base: &Path, p: impl AsRef<str>) -> PathBuf {
    match expand_path(p) {
        abs if abs.is_absolute() => abs,
        rel => base.join(rel),
    }
}
