//! Configuration loading from the environment and disk.
//!
//! Precedence per key: environment variable, then TOML file entry, then the
//! declared default. Every key that fails to parse is collected so an operator
//! sees all of them at once.

use std::fs;
use std::path::Path;

use crate::config::{ConfigStore, ConfigValue, ValueKind, Variable};

/// A value that was present but could not be parsed as its declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidValue {
    pub key: &'static str,
    pub kind: ValueKind,
    pub raw: String,
}

impl std::fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} expects {}, got {:?}", self.key, self.kind, self.raw)
    }
}

/// Error type for configuration loading.
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(Vec<InvalidValue>),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "IO error: {}", e),
            LoadError::Parse(e) => write!(f, "Parse error: {}", e),
            LoadError::Invalid(errors) => {
                write!(f, "Invalid configuration values: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            LoadError::Parse(e) => Some(e),
            LoadError::Invalid(_) => None,
        }
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send>;

/// Populates a [`ConfigStore`] key by key with declared defaults.
pub struct EnvLoader {
    store: ConfigStore,
    lookup: Lookup,
    file: Option<toml::Table>,
    invalid: Vec<InvalidValue>,
}

impl EnvLoader {
    /// Loader reading the process environment.
    pub fn from_env() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Loader reading values through `lookup` instead of the environment.
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + 'static,
    {
        Self {
            store: ConfigStore::new(),
            lookup: Box::new(lookup),
            file: None,
            invalid: Vec::new(),
        }
    }

    /// Layer a flat TOML table (`KEY = value`) beneath the environment.
    pub fn with_file(self, path: &Path) -> Result<Self, LoadError> {
        let content = fs::read_to_string(path).map_err(LoadError::Io)?;
        self.with_toml(&content)
    }

    pub fn with_toml(mut self, content: &str) -> Result<Self, LoadError> {
        let table: toml::Table = toml::from_str(content).map_err(LoadError::Parse)?;
        self.file = Some(table);
        Ok(self)
    }

    /// Resolve `key` and store it; the key is always registered afterwards.
    pub fn load<T: ConfigValue>(&mut self, key: Variable<T>, default: T) -> &mut Self {
        let value = match self.resolve(key) {
            Some(Ok(value)) => value,
            Some(Err(raw)) => {
                self.invalid.push(InvalidValue {
                    key: key.name(),
                    kind: T::KIND,
                    raw,
                });
                default
            }
            None => default,
        };
        self.store.set(key, value);
        self
    }

    fn resolve<T: ConfigValue>(&self, key: Variable<T>) -> Option<Result<T, String>> {
        if let Some(raw) = (self.lookup)(key.name()) {
            return Some(T::parse_raw(&raw).ok_or(raw));
        }

        let value = self.file.as_ref()?.get(key.name())?;
        Some(T::from_toml(value).ok_or_else(|| value.to_string()))
    }

    /// Finish loading. Fails if any value could not be parsed.
    pub fn finish(self) -> Result<ConfigStore, LoadError> {
        if !self.invalid.is_empty() {
            return Err(LoadError::Invalid(self.invalid));
        }
        Ok(self.store)
    }
}
