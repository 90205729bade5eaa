use std::collections::{BTreeMap, HashSet};
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::XrefError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mapping {
    Flat(BTreeMap<String, String>),
    Multi(BTreeMap<String, Vec<String>>),
    Nested(BTreeMap<String, BTreeMap<String, Vec<String>>>),
}

impl Default for Mapping {
    fn default() -> Self {
        Mapping::Multi(BTreeMap::new())
    }
}

impl Mapping {
    pub fn load(path: &Utf8Path) -> Result<Self, XrefError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| XrefError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|err| XrefError::ConfigParse(format!("mapping {path}: {err}")))
    }

    pub fn contains(&self, key: &str, category: Option<&str>) -> bool {
        match self {
            Mapping::Flat(map) => map.contains_key(key),
            Mapping::Multi(map) => map.contains_key(key),
            Mapping::Nested(map) => category
                .and_then(|category| map.get(category))
                .is_some_and(|inner| inner.contains_key(key)),
        }
    }

    pub fn candidates(&self, key: &str, category: Option<&str>) -> Vec<String> {
        let raw: Vec<&String> = match self {
            Mapping::Flat(map) => map.get(key).into_iter().collect(),
            Mapping::Multi(map) => map.get(key).into_iter().flatten().collect(),
            Mapping::Nested(map) => category
                .and_then(|category| map.get(category))
                .and_then(|inner| inner.get(key))
                .into_iter()
                .flatten()
                .collect(),
        };
        let mut seen = HashSet::new();
        raw.into_iter()
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .filter(|value| seen.insert(*value))
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        match self {
            Mapping::Flat(map) => map.len(),
            Mapping::Multi(map) => map.len(),
            Mapping::Nested(map) => map.values().map(BTreeMap::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<(String, Vec<String>)> for Mapping {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        let mut map = BTreeMap::<String, Vec<String>>::new();
        for (key, values) in iter {
            map.entry(key).or_default().extend(values);
        }
        Mapping::Multi(map)
    }
}
