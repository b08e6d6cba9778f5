//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment (+ optional TOML file)
//!     → loader.rs (parse by declared type, apply defaults)
//!     → ConfigStore (one partition per value type)
//!     → shared by reference with every bundle (read-only)
//! ```
//!
//! # Design Decisions
//! - A key's value type is part of its identity: `Variable<bool>` and
//!   `Variable<String>` with the same name are different keys
//! - Reads never fail; an absent key reads as its type's zero value
//! - Presence is only observable through [`ConfigStore::keys_registered`]
//! - The store is built once and never mutated after bundles see it

pub mod loader;
pub mod schema;

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use thiserror::Error;

pub use loader::{EnvLoader, LoadError};

/// Errors raised by the configuration contract.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// One or more required keys are absent. Lists every missing key, in the
    /// order they were requested.
    #[error("missing configuration variables: {}", .0.join(", "))]
    MissingConfiguration(Vec<String>),
}

impl ConfigError {
    /// Names of the missing keys.
    pub fn missing_keys(&self) -> &[String] {
        match self {
            ConfigError::MissingConfiguration(keys) => keys,
        }
    }
}

/// The closed set of value kinds a [`Variable`] may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Int64,
    Float64,
    Bool,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Int64 => "int64",
            ValueKind::Float64 => "float64",
            ValueKind::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// A typed, named configuration key.
///
/// Declared as constants by the module that consumes them:
///
/// ```
/// use api_runtime::config::Variable;
///
/// const SERVER_PORT: Variable<i64> = Variable::new("SERVER_PORT");
/// assert_eq!(SERVER_PORT.name(), "SERVER_PORT");
/// ```
pub struct Variable<T> {
    name: &'static str,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Variable<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _kind: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Variable<T> {}

impl<T> PartialEq for Variable<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for Variable<T> {}

impl<T> Hash for Variable<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl<T: ConfigValue> fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable<{}>({})", T::KIND, self.name)
    }
}

impl<T> fmt::Display for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for String {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
    impl Sealed for bool {}
}

/// A value type that owns a partition in [`ConfigStore`].
///
/// Sealed: only `String`, `i64`, `f64` and `bool` implement it.
pub trait ConfigValue: sealed::Sealed + Clone + Default + fmt::Debug + Send + Sync + 'static {
    const KIND: ValueKind;

    #[doc(hidden)]
    fn partition(store: &ConfigStore) -> &HashMap<Variable<Self>, Self>;

    #[doc(hidden)]
    fn partition_mut(store: &mut ConfigStore) -> &mut HashMap<Variable<Self>, Self>;

    /// Parse a raw textual value (environment variable, TOML string).
    fn parse_raw(raw: &str) -> Option<Self>;

    /// Convert a TOML value, falling back to [`ConfigValue::parse_raw`] for strings.
    fn from_toml(value: &toml::Value) -> Option<Self>;
}

impl ConfigValue for String {
    const KIND: ValueKind = ValueKind::String;

    fn partition(store: &ConfigStore) -> &HashMap<Variable<Self>, Self> {
        &store.strings
    }

    fn partition_mut(store: &mut ConfigStore) -> &mut HashMap<Variable<Self>, Self> {
        &mut store.strings
    }

    fn parse_raw(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl ConfigValue for i64 {
    const KIND: ValueKind = ValueKind::Int64;

    fn partition(store: &ConfigStore) -> &HashMap<Variable<Self>, Self> {
        &store.ints
    }

    fn partition_mut(store: &mut ConfigStore) -> &mut HashMap<Variable<Self>, Self> {
        &mut store.ints
    }

    fn parse_raw(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn from_toml(value: &toml::Value) -> Option<Self> {
        match value {
            toml::Value::Integer(i) => Some(*i),
            toml::Value::String(s) => Self::parse_raw(s),
            _ => None,
        }
    }
}

impl ConfigValue for f64 {
    const KIND: ValueKind = ValueKind::Float64;

    fn partition(store: &ConfigStore) -> &HashMap<Variable<Self>, Self> {
        &store.floats
    }

    fn partition_mut(store: &mut ConfigStore) -> &mut HashMap<Variable<Self>, Self> {
        &mut store.floats
    }

    fn parse_raw(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn from_toml(value: &toml::Value) -> Option<Self> {
        match value {
            toml::Value::Float(f) => Some(*f),
            toml::Value::Integer(i) => Some(*i as f64),
            toml::Value::String(s) => Self::parse_raw(s),
            _ => None,
        }
    }
}

impl ConfigValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn partition(store: &ConfigStore) -> &HashMap<Variable<Self>, Self> {
        &store.bools
    }

    fn partition_mut(store: &mut ConfigStore) -> &mut HashMap<Variable<Self>, Self> {
        &mut store.bools
    }

    // Same spellings as the usual environment conventions: 1/0, t/f, true/false.
    fn parse_raw(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
            _ => None,
        }
    }

    fn from_toml(value: &toml::Value) -> Option<Self> {
        match value {
            toml::Value::Boolean(b) => Some(*b),
            toml::Value::String(s) => Self::parse_raw(s),
            _ => None,
        }
    }
}

/// A key whose presence can be checked against a [`ConfigStore`].
///
/// Implemented for every `Variable<T>`, so keys of different value types can
/// be mixed in one [`ConfigStore::keys_registered`] call.
pub trait RequiredKey {
    fn key_name(&self) -> &'static str;
    fn is_registered(&self, store: &ConfigStore) -> bool;
}

impl<T: ConfigValue> RequiredKey for Variable<T> {
    fn key_name(&self) -> &'static str {
        self.name
    }

    fn is_registered(&self, store: &ConfigStore) -> bool {
        T::partition(store).contains_key(self)
    }
}

/// Type-partitioned configuration registry.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    strings: HashMap<Variable<String>, String>,
    ints: HashMap<Variable<i64>, i64>,
    floats: HashMap<Variable<f64>, f64>,
    bools: HashMap<Variable<bool>, bool>,
}

impl ConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value; an absent key yields `T::default()`.
    pub fn get<T: ConfigValue>(&self, key: Variable<T>) -> T {
        T::partition(self).get(&key).cloned().unwrap_or_default()
    }

    pub fn get_string(&self, key: Variable<String>) -> String {
        self.get(key)
    }

    pub fn get_i64(&self, key: Variable<i64>) -> i64 {
        self.get(key)
    }

    pub fn get_f64(&self, key: Variable<f64>) -> f64 {
        self.get(key)
    }

    pub fn get_bool(&self, key: Variable<bool>) -> bool {
        self.get(key)
    }

    /// Set a single value, returning the previous one if present.
    pub fn set<T: ConfigValue>(&mut self, key: Variable<T>, value: T) -> Option<T> {
        T::partition_mut(self).insert(key, value)
    }

    /// Write a batch of values of one type, overwriting existing entries.
    pub fn write<T, I>(&mut self, values: I)
    where
        T: ConfigValue,
        I: IntoIterator<Item = (Variable<T>, T)>,
    {
        T::partition_mut(self).extend(values);
    }

    /// Builder form of [`ConfigStore::set`], handy for test fixtures.
    pub fn with<T: ConfigValue>(mut self, key: Variable<T>, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Verify that every key is present in its type's partition.
    ///
    /// Fails with [`ConfigError::MissingConfiguration`] listing exactly the
    /// absent keys, in request order.
    pub fn keys_registered(&self, keys: &[&dyn RequiredKey]) -> Result<(), ConfigError> {
        let missing: Vec<String> = keys
            .iter()
            .filter(|key| !key.is_registered(self))
            .map(|key| key.key_name().to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingConfiguration(missing))
        }
    }

    /// Total number of stored values across all partitions.
    pub fn len(&self) -> usize {
        self.strings.len() + self.ints.len() + self.floats.len() + self.bools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
