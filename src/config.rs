//! Allow-lists telling which worksheets each shape may read.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Result, ToolError};
use crate::shape::ColumnShape;

/// Per-shape allow-lists of worksheet names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapeConfig {
    allow: BTreeMap<ColumnShape, Vec<String>>,
}

impl ShapeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the allow-list of `shape`.
    pub fn with_sheets<I, S>(mut self, shape: ColumnShape, sheets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow
            .insert(shape, sheets.into_iter().map(Into::into).collect());
        self
    }

    /// Reads the `CDEH`, `CDFI`, `CDEG`, `CDER` and `CEFH` variables of the
    /// process environment.
    pub fn from_env() -> Self {
        Self::from_vars(
            ColumnShape::ALL
                .iter()
                .filter_map(|shape| std::env::var(shape.name()).ok().map(|v| (shape.name(), v))),
        )
    }

    /// Builds the config from `(variable, comma separated list)` pairs.
    /// Variables that are not shape names are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::new();
        for (name, value) in vars {
            let Ok(shape) = name.as_ref().parse::<ColumnShape>() else {
                continue;
            };
            let sheets = split_list(value.as_ref());
            debug!(%shape, count = sheets.len(), "loaded allow-list");
            config.allow.insert(shape, sheets);
        }
        config
    }

    /// Reads a JSON object keyed by shape name, for example
    /// `{"CDEH": ["PriceList"], "CEFH": ["Options"]}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(data)?;
        let mut config = Self::new();
        for (name, sheets) in raw {
            let shape = name.parse::<ColumnShape>()?;
            let sheets = sheets
                .iter()
                .map(|sheet| sheet.trim().to_string())
                .filter(|sheet| !sheet.is_empty())
                .collect();
            config.allow.insert(shape, sheets);
        }
        Ok(config)
    }

    /// Loads the JSON file when one is given, otherwise the environment
    /// after applying `env_file` (or `.env` in the working directory).
    pub fn load(config_path: Option<&Path>, env_file: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ToolError::MissingInput(path.to_path_buf()));
            }
            return Self::from_json_file(path);
        }

        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|error| {
                    ToolError::InvalidConfig(format!("cannot load {}: {error}", path.display()))
                })?;
            }
            None => {
                if let Err(error) = dotenvy::dotenv() {
                    if !error.not_found() {
                        warn!(%error, "ignoring unreadable .env file");
                    }
                }
            }
        }
        Ok(Self::from_env())
    }

    pub fn sheets(&self, shape: ColumnShape) -> &[String] {
        self.allow.get(&shape).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First shape, in priority order, whose allow-list names `sheet`.
    pub fn resolve(&self, sheet: &str) -> Option<ColumnShape> {
        ColumnShape::ALL
            .into_iter()
            .find(|shape| self.sheets(*shape).iter().any(|name| name == sheet))
    }

    /// Every configured sheet name in shape priority order.
    pub fn allowed_names(&self) -> Vec<String> {
        ColumnShape::ALL
            .iter()
            .flat_map(|shape| self.sheets(*shape).iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.allow.values().all(Vec::is_empty)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
