//! The tabular stores backing `vectors` and `rasters` (C3): append-only-until-dropped,
//! keyed by a stable [`FeatureName`], carrying a geometry plus a dynamically typed
//! attribute schema that only widens, never narrows (I5).

use std::collections::HashMap;

use geo::Epsg;
use geo::vector::geojson::{self, FeatureRow};
use geo::vector::schema::{Attributes, Field, FieldType, Schema};
use geo_types::Geometry;
use graph::FeatureName;

use crate::{Error, Result};

/// One row of a table: a stable name, a geometry in the connector CRS, and its attribute
/// values (including the index column itself, so it round-trips through GeoJSON).
#[derive(Debug, Clone)]
pub struct Row {
    pub name: FeatureName,
    pub geometry: Geometry<f64>,
    pub attributes: Attributes,
}

impl Row {
    pub fn new(name: impl Into<FeatureName>, geometry: Geometry<f64>, attributes: Attributes) -> Self {
        Row {
            name: name.into(),
            geometry,
            attributes,
        }
    }
}

/// A schema-checked table of rows keyed by [`FeatureName`]. `required_columns` are the
/// column names every inserted row must provide (beyond the always-present geometry);
/// everything else attaches dynamically to the schema the first time it's seen (I5).
#[derive(Debug, Clone)]
pub struct Table {
    index_field: String,
    required_columns: Vec<String>,
    schema: Schema,
    rows: Vec<Row>,
    index: HashMap<FeatureName, usize>,
}

impl Table {
    pub fn new(index_field: impl Into<String>, required_columns: Vec<String>) -> Self {
        let index_field = index_field.into();
        let schema = Schema::new(vec![geo::vector::schema::FieldInfo::new(index_field.clone(), FieldType::String)]);
        Table {
            index_field,
            required_columns,
            schema,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn index_field(&self) -> &str {
        &self.index_field
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, name: &FeatureName) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &FeatureName) -> Option<&Row> {
        self.index.get(name).map(|&i| &self.rows[i])
    }

    pub fn get_mut(&mut self, name: &FeatureName) -> Option<&mut Row> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.rows[i]),
            None => None,
        }
    }

    /// Rows in insertion order — the order drivers and tests rely on for determinism.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &FeatureName> {
        self.rows.iter().map(|r| &r.name)
    }

    /// Checks the incoming batch against I5/I4 and the "no duplicate/conflicting key"
    /// rules from §4.2/§4.3, widening the schema (with a warning) for any genuinely new
    /// column. Does not mutate the table itself — call [`Table::append`] afterwards.
    pub fn validate_new_rows(&mut self, new_rows: &[Row]) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for row in new_rows {
            if !seen.insert(row.name.clone()) {
                return Err(Error::DuplicateInput(row.name.clone()));
            }
            if self.contains(&row.name) {
                return Err(Error::KeyConflict(row.name.clone()));
            }
            if geo::vector::geom::is_null(&row.geometry) {
                return Err(Error::NullGeometry(row.name.clone()));
            }
            for required in &self.required_columns {
                if !row.attributes.contains_key(required) {
                    return Err(Error::SchemaMismatch(required.clone()));
                }
            }
        }

        for row in new_rows {
            for (name, value) in &row.attributes {
                if self.schema.contains(name) {
                    continue;
                }
                if let Some(field_type) = value.field_type() {
                    log::warn!("table: widening schema with new column '{name}' ({field_type:?}) from insert");
                    self.schema.widen(name, field_type);
                }
            }
        }

        Ok(())
    }

    /// Appends pre-validated rows (see [`Table::validate_new_rows`]), preserving emission
    /// order.
    pub fn append(&mut self, new_rows: Vec<Row>) {
        for row in new_rows {
            self.index.insert(row.name.clone(), self.rows.len());
            self.rows.push(row);
        }
    }

    /// Removes a row by name, if present, re-indexing the rows that shifted.
    pub fn remove(&mut self, name: &FeatureName) -> Option<Row> {
        let i = self.index.remove(name)?;
        let removed = self.rows.remove(i);
        for (_, idx) in self.index.iter_mut() {
            if *idx > i {
                *idx -= 1;
            }
        }
        Some(removed)
    }

    pub fn set_attribute(&mut self, name: &FeatureName, key: &str, value: Field) -> Result<()> {
        if let Some(field_type) = value.field_type()
            && self.schema.widen(key, field_type)
        {
            log::debug!("table: widening schema with new column '{key}' from set_attribute");
        }
        let row = self.get_mut(name).ok_or_else(|| Error::UnknownKey(name.clone()))?;
        row.attributes.insert(key.to_string(), value);
        Ok(())
    }

    pub fn reproject(&mut self, from: Epsg, to: Epsg) -> Result<()> {
        for row in &mut self.rows {
            row.geometry = geo::crs::reproject_geometry(&row.geometry, from, to)?;
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let rows: Vec<FeatureRow> = self
            .rows
            .iter()
            .map(|row| {
                let mut attributes = row.attributes.clone();
                attributes.insert(self.index_field.clone(), Field::String(row.name.to_string()));
                FeatureRow {
                    geometry: row.geometry.clone(),
                    attributes,
                }
            })
            .collect();
        geojson::write(path, &self.schema, &rows)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<std::path::Path>, index_field: impl Into<String>, required_columns: Vec<String>) -> Result<Self> {
        let index_field = index_field.into();
        let (schema, rows) = geojson::read(path)?;

        let mut table = Table {
            index_field: index_field.clone(),
            required_columns,
            schema,
            rows: Vec::with_capacity(rows.len()),
            index: HashMap::with_capacity(rows.len()),
        };

        for mut feature_row in rows {
            let name = feature_row
                .attributes
                .remove(&index_field)
                .and_then(|f| f.as_str().map(str::to_string))
                .ok_or_else(|| Error::SchemaMismatch(index_field.clone()))?;
            feature_row.attributes.insert(index_field.clone(), Field::String(name.clone()));
            table.index.insert(FeatureName::from(name.as_str()), table.rows.len());
            table.rows.push(Row::new(name, feature_row.geometry, feature_row.attributes));
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, Polygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(x0, y0), (x0, y1), (x1, y1), (x1, y0), (x0, y0)]),
            vec![],
        ))
    }

    #[test]
    fn duplicate_input_keys_are_rejected() {
        let mut table = Table::new("vector_name", vec![]);
        let rows = vec![
            Row::new("p1", square(0.0, 0.0, 1.0, 1.0), Attributes::new()),
            Row::new("p1", square(1.0, 1.0, 2.0, 2.0), Attributes::new()),
        ];
        assert!(matches!(table.validate_new_rows(&rows), Err(Error::DuplicateInput(_))));
    }

    #[test]
    fn key_conflict_against_existing_row() {
        let mut table = Table::new("vector_name", vec![]);
        table.append(vec![Row::new("p1", square(0.0, 0.0, 1.0, 1.0), Attributes::new())]);
        let rows = vec![Row::new("p1", square(1.0, 1.0, 2.0, 2.0), Attributes::new())];
        assert!(matches!(table.validate_new_rows(&rows), Err(Error::KeyConflict(_))));
    }

    #[test]
    fn null_geometry_is_rejected() {
        let mut table = Table::new("vector_name", vec![]);
        let empty = Geometry::Polygon(Polygon::new(LineString::new(vec![]), vec![]));
        let rows = vec![Row::new("p1", empty, Attributes::new())];
        assert!(matches!(table.validate_new_rows(&rows), Err(Error::NullGeometry(_))));
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let mut table = Table::new("raster_name", vec!["orig_crs_epsg_code".to_string()]);
        let rows = vec![Row::new("r1", square(0.0, 0.0, 1.0, 1.0), Attributes::new())];
        assert!(matches!(table.validate_new_rows(&rows), Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn schema_widens_on_new_column() {
        let mut table = Table::new("vector_name", vec![]);
        let mut attrs = Attributes::new();
        attrs.insert("type".to_string(), Field::String("building".to_string()));
        let rows = vec![Row::new("p1", square(0.0, 0.0, 1.0, 1.0), attrs)];
        table.validate_new_rows(&rows).unwrap();
        table.append(rows);
        assert!(table.schema().contains("type"));
    }

    #[test]
    fn remove_reindexes_remaining_rows() {
        let mut table = Table::new("vector_name", vec![]);
        table.append(vec![
            Row::new("p1", square(0.0, 0.0, 1.0, 1.0), Attributes::new()),
            Row::new("p2", square(1.0, 1.0, 2.0, 2.0), Attributes::new()),
            Row::new("p3", square(2.0, 2.0, 3.0, 3.0), Attributes::new()),
        ]);
        table.remove(&FeatureName::from("p2"));
        assert!(table.get(&FeatureName::from("p1")).is_some());
        assert!(table.get(&FeatureName::from("p3")).is_some());
        assert_eq!(table.len(), 2);
        assert_eq!(table.names().collect::<Vec<_>>(), vec![&FeatureName::from("p1"), &FeatureName::from("p3")]);
    }

    #[test]
    fn round_trips_through_geojson() {
        let dir = std::env::temp_dir().join(format!("dataset-table-test-{}", std::process::id()));
        let path = dir.join("vectors.geojson");

        let mut table = Table::new("vector_name", vec![]);
        let mut attrs = Attributes::new();
        attrs.insert("raster_count".to_string(), Field::Integer(0));
        table.append(vec![Row::new("p1", square(0.0, 0.0, 1.0, 1.0), attrs)]);
        table.save(&path).unwrap();

        let loaded = Table::load(&path, "vector_name", vec![]).unwrap();
        assert_eq!(loaded.len(), 1);
        let row = loaded.get(&FeatureName::from("p1")).unwrap();
        assert_eq!(row.attributes.get("raster_count").and_then(Field::as_i64), Some(0));

        std::fs::remove_dir_all(&dir).ok();
    }
}
