//! The connector's process-wide attribute bag: CRS, the task class list, the background
//! class, derived-column naming, and the label type left behind by the last label maker
//! that ran. Recognized keys get first-class accessors; anything else a caller sets is
//! carried through `save`/`load` unchanged in `extras`.

use std::path::Path;

use geo::Epsg;
use serde_json::{Map, Value};

use crate::{Error, Result};

pub const DEFAULT_RASTER_COUNT_COL_NAME: &str = "raster_count";

/// Flat attribute dict persisted as `connector/attrs.json`.
#[derive(Debug, Clone)]
pub struct Attrs {
    pub crs_epsg: Epsg,
    pub task_vector_classes: Vec<String>,
    pub background_class: Option<String>,
    pub raster_count_col_name: String,
    pub label_type: Option<String>,
    pub extras: Map<String, Value>,
}

impl Default for Attrs {
    fn default() -> Self {
        Attrs {
            crs_epsg: Epsg::new(4326),
            task_vector_classes: Vec::new(),
            background_class: None,
            raster_count_col_name: DEFAULT_RASTER_COUNT_COL_NAME.to_string(),
            label_type: None,
            extras: Map::new(),
        }
    }
}

impl Attrs {
    pub fn new(crs_epsg: Epsg) -> Self {
        Attrs {
            crs_epsg,
            ..Default::default()
        }
    }

    /// I6: `task_vector_classes` and `background_class` must be disjoint.
    pub fn validate(&self) -> Result<()> {
        if let Some(bg) = &self.background_class
            && self.task_vector_classes.contains(bg)
        {
            return Err(Error::InvalidArgument(format!(
                "background_class '{bg}' must not also be a task_vector_class"
            )));
        }
        Ok(())
    }

    /// `task_vector_classes ∪ {background_class}`, task classes first, in declared order.
    pub fn all_vector_classes(&self) -> Vec<String> {
        let mut classes = self.task_vector_classes.clone();
        if let Some(bg) = &self.background_class {
            classes.push(bg.clone());
        }
        classes
    }

    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extras.insert(key.into(), value);
    }

    pub fn get_extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut doc = self.extras.clone();
        doc.insert(
            "task_vector_classes".to_string(),
            Value::Array(self.task_vector_classes.iter().map(|c| Value::String(c.clone())).collect()),
        );
        doc.insert(
            "background_class".to_string(),
            self.background_class.clone().map(Value::String).unwrap_or(Value::Null),
        );
        doc.insert("crs_epsg_code".to_string(), Value::from(self.crs_epsg.code()));
        doc.insert("raster_count_col_name".to_string(), Value::String(self.raster_count_col_name.clone()));
        if let Some(label_type) = &self.label_type {
            doc.insert("label_type".to_string(), Value::String(label_type.clone()));
        }

        let serialized = serde_json::to_string_pretty(&Value::Object(doc)).map_err(Error::Json)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingAttrsFile(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut doc: Map<String, Value> = serde_json::from_str(&contents).map_err(|e| Error::CorruptAttrsFile(path.to_path_buf(), e.to_string()))?;

        let task_vector_classes = doc
            .remove("task_vector_classes")
            .and_then(|v| v.as_array().cloned())
            .map(|arr| arr.into_iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let background_class = doc.remove("background_class").and_then(|v| v.as_str().map(str::to_string));
        let crs_epsg_code = doc
            .remove("crs_epsg_code")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::CorruptAttrsFile(path.to_path_buf(), "missing crs_epsg_code".to_string()))?;
        let raster_count_col_name = doc
            .remove("raster_count_col_name")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_RASTER_COUNT_COL_NAME.to_string());
        let label_type = doc.remove("label_type").and_then(|v| v.as_str().map(str::to_string));

        let attrs = Attrs {
            crs_epsg: Epsg::new(crs_epsg_code as i32),
            task_vector_classes,
            background_class,
            raster_count_col_name,
            label_type,
            extras: doc,
        };
        attrs.validate()?;
        Ok(attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjointness_is_enforced() {
        let mut attrs = Attrs::new(Epsg::new(4326));
        attrs.task_vector_classes = vec!["building".to_string()];
        attrs.background_class = Some("building".to_string());
        assert!(attrs.validate().is_err());
    }

    #[test]
    fn all_vector_classes_appends_background_last() {
        let mut attrs = Attrs::new(Epsg::new(4326));
        attrs.task_vector_classes = vec!["building".to_string(), "road".to_string()];
        attrs.background_class = Some("bg".to_string());
        assert_eq!(attrs.all_vector_classes(), vec!["building", "road", "bg"]);
    }

    #[test]
    fn round_trips_through_json() {
        let dir = std::env::temp_dir().join(format!("dataset-attrs-test-{}", std::process::id()));
        let path = dir.join("attrs.json");

        let mut attrs = Attrs::new(Epsg::new(31370));
        attrs.task_vector_classes = vec!["a".to_string(), "b".to_string()];
        attrs.background_class = Some("bg".to_string());
        attrs.label_type = Some("categorical".to_string());
        attrs.set_extra("note", Value::String("hello".to_string()));
        attrs.save(&path).unwrap();

        let loaded = Attrs::load(&path).unwrap();
        assert_eq!(loaded.crs_epsg, attrs.crs_epsg);
        assert_eq!(loaded.task_vector_classes, attrs.task_vector_classes);
        assert_eq!(loaded.background_class, attrs.background_class);
        assert_eq!(loaded.label_type, attrs.label_type);
        assert_eq!(loaded.get_extra("note"), Some(&Value::String("hello".to_string())));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_errors() {
        let result = Attrs::load("/nonexistent/attrs.json");
        assert!(matches!(result, Err(Error::MissingAttrsFile(_))));
    }
}
