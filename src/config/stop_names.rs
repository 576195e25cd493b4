use anyhow::{Context, Result};
use std::collections::HashMap;

/// Maps stop ids to display names.
///
/// Stored as a plain JSON object on disk:
/// ```json
/// {
///   "A27": "42 St-Port Authority Bus Terminal",
///   "A28": "34 St-Penn Station"
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StopNames {
    entries: HashMap<String, String>,
}

impl StopNames {
    /// Loads the directory from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading stop names from '{path}'"))?;
        let entries: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("parsing stop names in '{path}'"))?;
        Ok(Self { entries })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Display name for `stop_id`, or the id itself when unknown.
    pub fn name<'a>(&'a self, stop_id: &'a str) -> &'a str {
        self.entries.get(stop_id).map_or(stop_id, String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_stop_falls_back_to_id() {
        let names = StopNames::from_pairs([("A27", "42 St")]);
        assert_eq!(names.name("A27"), "42 St");
        assert_eq!(names.name("X99"), "X99");
    }

    #[test]
    fn test_load_from_json_file() {
        let path = format!("{}/service_status_test_names.json", std::env::temp_dir().display());
        std::fs::write(&path, r#"{"A01": "Inwood-207 St"}"#).unwrap();

        let names = StopNames::load(&path).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names.name("A01"), "Inwood-207 St");

        std::fs::remove_file(&path).unwrap();
    }
}
