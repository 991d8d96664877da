use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde_yaml::Value;

use crate::{errors::Error, retry::RetryPolicy, Result};

pub const CONFIG_DIR_ENV: &str = "TELEBACKUP_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "provider-config.yaml";

/// A config value after list collapsing: single-element lists become scalars.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigValue {
    Scalar(String),
    List(Vec<String>),
}

impl ConfigValue {
    pub fn into_list(self) -> Vec<String> {
        match self {
            Self::Scalar(s) => vec![s],
            Self::List(items) => items,
        }
    }
}

/// The validated key -> value mapping read from `provider-config.yaml`.
///
/// Every key present in the file has passed validation; required keys are
/// checked when projecting into [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigRecord {
    path: PathBuf,
    values: BTreeMap<String, ConfigValue>,
}

impl ConfigRecord {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigMissing {
                path: path.to_path_buf(),
            });
        }
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents, path)
    }

    /// Parse and validate YAML where every key maps to a list of scalars.
    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        let invalid = |key: &str| Error::ConfigInvalid {
            key: key.to_string(),
            path: path.to_path_buf(),
        };

        let doc: Value = serde_yaml::from_str(contents)?;
        let mapping = match doc {
            Value::Mapping(m) => m,
            Value::Null => Default::default(),
            _ => return Err(invalid(CONFIG_FILE_NAME)),
        };

        let mut values = BTreeMap::new();
        for (key, value) in mapping {
            let key = scalar_to_string(&key).ok_or_else(|| invalid(CONFIG_FILE_NAME))?;

            let Value::Sequence(items) = value else {
                return Err(invalid(&key));
            };
            if !items.first().is_some_and(is_truthy) {
                return Err(invalid(&key));
            }

            let mut items = items
                .iter()
                .map(scalar_to_string)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid(&key))?;

            let value = if items.len() == 1 {
                ConfigValue::Scalar(items.remove(0))
            } else {
                ConfigValue::List(items)
            };
            values.insert(key, value);
        }

        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    fn invalid(&self, key: &str) -> Error {
        Error::ConfigInvalid {
            key: key.to_string(),
            path: self.path.clone(),
        }
    }

    fn required(&self, key: &str) -> Result<&ConfigValue> {
        self.get(key).ok_or_else(|| self.invalid(key))
    }

    fn required_scalar(&self, key: &str) -> Result<String> {
        self.optional_scalar(key)?.ok_or_else(|| self.invalid(key))
    }

    fn optional_scalar(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Scalar(s)) => Ok(Some(s.clone())),
            Some(ConfigValue::List(_)) => Err(self.invalid(key)),
        }
    }

    fn optional_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.optional_scalar(key)?
            .map(|s| s.trim().parse::<T>().map_err(|_| self.invalid(key)))
            .transpose()
    }
}

/// Typed configuration for a copy run.
#[derive(Clone, Debug)]
pub struct Config {
    pub config_dir: PathBuf,

    // Platform credentials
    pub api_id: i32,
    pub api_hash: String,
    pub session_name: String,

    // Channels
    pub source_channels: Vec<String>,
    pub destination_channel: String,

    // State files
    pub sent_ids_path: PathBuf,
    pub failed_ids_path: Option<PathBuf>,

    // Rate limiting
    pub max_flood_waits: Option<u32>,
    pub send_interval: Duration,
}

impl Config {
    /// Load from the per-user config directory.
    pub fn load() -> Result<Self> {
        let dir = config_dir()?;
        Self::load_from_dir(&dir)
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let record = ConfigRecord::load(&dir.join(CONFIG_FILE_NAME))?;
        Self::from_record(&record, dir)
    }

    pub fn from_record(record: &ConfigRecord, dir: &Path) -> Result<Self> {
        let api_id = record
            .required_scalar("api_id")?
            .trim()
            .parse::<i32>()
            .map_err(|_| record.invalid("api_id"))?;
        let api_hash = record.required_scalar("api_hash")?;
        let session_name = record.required_scalar("session_name")?;
        let source_channels = record.required("source_channel")?.clone().into_list();
        let destination_channel = record.required_scalar("destination_channel")?;
        let sent_ids_path = dir.join(record.required_scalar("sent_ids_file")?);

        let failed_ids_path = record
            .optional_scalar("failed_ids_file")?
            .map(|name| dir.join(name));
        let max_flood_waits = record.optional_parsed::<u32>("max_flood_waits")?;
        let send_interval =
            Duration::from_millis(record.optional_parsed::<u64>("send_interval_ms")?.unwrap_or(0));

        Ok(Self {
            config_dir: dir.to_path_buf(),
            api_id,
            api_hash,
            session_name,
            source_channels,
            destination_channel,
            sent_ids_path,
            failed_ids_path,
            max_flood_waits,
            send_interval,
        })
    }

    /// Location of the platform client's persisted session.
    pub fn session_path(&self) -> PathBuf {
        self.config_dir.join(format!("{}.session", self.session_name))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_flood_waits: self.max_flood_waits,
        }
    }

    /// Create the config directory so session and state files can be written.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.config_dir)?;
        Ok(())
    }
}

/// `$TELEBACKUP_CONFIG_DIR`, or `~/.config/telebackup`.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = home_dir().ok_or_else(|| Error::External("HOME is not set".to_string()))?;
    Ok(home.join(".config").join("telebackup"))
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(items) => !items.is_empty(),
        Value::Mapping(m) => !m.is_empty(),
        Value::Tagged(t) => is_truthy(&t.value),
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}
