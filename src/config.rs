//! Flat key-value configuration with typed accessors.
//!
//! Keys are dotted strings (`app.base_url`). Values read from an INI-style
//! file remember which file they came from, so [`Config::getpath`] can
//! resolve relative paths against that file's directory.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration lookup and parse failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing config key `{0}`")]
    KeyNotFound(String),

    #[error("value `{value}` for config key `{key}` is not a boolean")]
    InvalidBoolean { key: String, value: String },

    #[error("value `{value}` for config key `{key}` is not an integer")]
    InvalidNumber { key: String, value: String },

    #[error("{}:{line}: malformed config line", file.display())]
    Parse { file: PathBuf, line: usize },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

const TRUTHY: [&str; 6] = ["y", "yes", "t", "true", "1", "on"];
const FALSY: [&str; 6] = ["n", "no", "f", "false", "0", "off"];

/// Dictionary-like configuration holder.
///
/// Cloning produces an independent snapshot; updates to the clone do not
/// affect the original.
#[derive(Clone, Debug, Default)]
pub struct Config {
    data: HashMap<String, String>,
    // Maps keys to their source file (if any).
    sourcemap: HashMap<String, PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from key/value pairs, with no provenance.
    pub fn from_map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut config = Self::new();
        config.update(pairs);
        config
    }

    /// Reads config from an INI-style file.
    ///
    /// Section and key names are dot-joined into a single flat namespace;
    /// this file:
    ///
    /// ```ini
    /// [section]
    /// foo = bar
    /// ```
    ///
    /// results in the key `section.foo` with value `"bar"`. Later files
    /// overwrite earlier values for the same flattened key. Each key records
    /// the file it came from.
    pub fn read_from_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;

        let mut section: Option<String> = None;
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                section = Some(name.trim().to_lowercase());
                continue;
            }
            let (current, parsed) = match (&section, line.split_once('=')) {
                (Some(section), Some(parsed)) => (section, parsed),
                _ => {
                    return Err(ConfigError::Parse {
                        file: path.to_path_buf(),
                        line: i + 1,
                    })
                }
            };
            let (k, v) = parsed;
            let key = format!("{current}.{}", k.trim().to_lowercase());
            self.data.insert(key.clone(), v.trim().to_string());
            self.sourcemap.insert(key, path.to_path_buf());
        }

        Ok(self)
    }

    /// Reads config from the given environment pairs.
    ///
    /// Only names beginning with `prefix` are considered. Names are
    /// prefix-stripped, lowercased, and `__` (double underscore) is replaced
    /// with `.` to form a config key: with prefix `"CONFIG_"`, the variable
    /// `CONFIG_DATABASE__URI` becomes the key `database.uri`.
    pub fn read_from_env<I, K, V>(&mut self, prefix: &str, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in pairs {
            if let Some(rest) = name.as_ref().strip_prefix(prefix) {
                let key = rest.to_lowercase().replace("__", ".");
                self.sourcemap.remove(&key);
                self.data.insert(key, value.into());
            }
        }
        self
    }

    /// Reads config from the process environment. See [`Config::read_from_env`].
    pub fn read_from_os_env(&mut self, prefix: &str) -> &mut Self {
        self.read_from_env(prefix, std::env::vars())
    }

    /// Bulk-sets values with no provenance.
    pub fn update<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in pairs {
            let key = k.into();
            self.sourcemap.remove(&key);
            self.data.insert(key, v.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Like [`Config::get`], but a missing key is an error.
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> BTreeSet<&str> {
        self.data.keys().map(String::as_str).collect()
    }

    /// Gets a boolean config value.
    ///
    /// A lower-cased value in `{y, yes, t, true, 1, on}` is `true`; in
    /// `{n, no, f, false, 0, off}` it is `false`; anything else is
    /// [`ConfigError::InvalidBoolean`].
    pub fn getbool(&self, key: &str) -> Result<bool, ConfigError> {
        let value = self.require(key)?;
        let lowered = value.to_lowercase();
        if TRUTHY.contains(&lowered.as_str()) {
            Ok(true)
        } else if FALSY.contains(&lowered.as_str()) {
            Ok(false)
        } else {
            Err(ConfigError::InvalidBoolean {
                key: key.to_string(),
                value: value.to_string(),
            })
        }
    }

    /// Like [`Config::getbool`], but a missing key yields `default`.
    /// A present-but-unparseable value is still an error.
    pub fn getbool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        if self.contains(key) {
            self.getbool(key)
        } else {
            Ok(default)
        }
    }

    /// Gets an integer config value.
    pub fn getint(&self, key: &str) -> Result<i64, ConfigError> {
        let value = self.require(key)?;
        value.parse().map_err(|_| ConfigError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Like [`Config::getint`], but a missing key yields `default`.
    pub fn getint_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        if self.contains(key) {
            self.getint(key)
        } else {
            Ok(default)
        }
    }

    /// Gets a config value as a path relative to its source file.
    ///
    /// If the value did not come from a file, returns it unchanged.
    pub fn getpath(&self, key: &str) -> Result<PathBuf, ConfigError> {
        self.require(key)?;
        Ok(self.resolve_path(key))
    }

    /// Like [`Config::getpath`], but a missing key yields `None`.
    pub fn getpath_opt(&self, key: &str) -> Option<PathBuf> {
        self.contains(key).then(|| self.resolve_path(key))
    }

    fn resolve_path(&self, key: &str) -> PathBuf {
        let value = PathBuf::from(&self.data[key]);
        match self.sourcemap.get(key).and_then(|source| source.parent()) {
            Some(dir) => dir.join(value),
            None => value,
        }
    }
}
