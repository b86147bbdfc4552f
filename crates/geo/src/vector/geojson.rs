//! Minimal GeoJSON FeatureCollection read/write for the connector's on-disk vectors/rasters
//! tables (`connector/vectors.geojson`, `connector/rasters.geojson`). Only the geometry kinds
//! the workspace actually produces (Point, Polygon, MultiPolygon) are supported; anything else
//! round-trips as an error rather than silently losing data.

use std::path::Path;

use geo_types::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use serde_json::{Map, Value, json};

use crate::vector::schema::{Attributes, Field, FieldType, Schema};
use crate::{Error, Result};

pub struct FeatureRow {
    pub geometry: Geometry<f64>,
    pub attributes: Attributes,
}

pub fn write(path: impl AsRef<Path>, schema: &Schema, rows: &[FeatureRow]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let features: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut properties = Map::new();
            for field_info in schema.fields() {
                let value = row.attributes.get(&field_info.name).cloned().unwrap_or(Field::Null);
                properties.insert(field_info.name.clone(), field_to_json(&value));
            }
            json!({
                "type": "Feature",
                "geometry": geometry_to_json(&row.geometry),
                "properties": Value::Object(properties),
            })
        })
        .collect();

    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });

    std::fs::write(path, serde_json::to_vec_pretty(&collection)?)?;
    Ok(())
}

pub fn read(path: impl AsRef<Path>) -> Result<(Schema, Vec<FeatureRow>)> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|_| Error::InvalidPath(path.to_path_buf()))?;
    let root: Value = serde_json::from_str(&contents)?;

    let features = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidArgument(format!("{}: not a GeoJSON FeatureCollection", path.display())))?;

    let mut schema = Schema::empty();
    let mut rows = Vec::with_capacity(features.len());

    for feature in features {
        let geometry_json = feature
            .get("geometry")
            .ok_or_else(|| Error::InvalidArgument("feature missing geometry".to_string()))?;
        let geometry = geometry_from_json(geometry_json)?;

        let mut attributes = Attributes::new();
        if let Some(properties) = feature.get("properties").and_then(Value::as_object) {
            for (name, value) in properties {
                let field = field_from_json(value);
                if let Some(field_type) = field.field_type() {
                    schema.widen(name, field_type);
                }
                attributes.insert(name.clone(), field);
            }
        }

        rows.push(FeatureRow { geometry, attributes });
    }

    Ok((schema, rows))
}

fn field_to_json(field: &Field) -> Value {
    match field {
        Field::String(s) => Value::String(s.clone()),
        Field::Integer(i) => Value::from(*i),
        Field::Float(f) => Value::from(*f),
        Field::Boolean(b) => Value::from(*b),
        Field::Null => Value::Null,
    }
}

fn field_from_json(value: &Value) -> Field {
    match value {
        Value::String(s) => Field::String(s.clone()),
        Value::Bool(b) => Field::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Field::Integer(i)
            } else {
                Field::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        _ => Field::Null,
    }
}

#[allow(dead_code)]
fn field_type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::Integer => "integer",
        FieldType::Float => "float",
        FieldType::Boolean => "boolean",
    }
}

fn geometry_to_json(geom: &Geometry<f64>) -> Value {
    match geom {
        Geometry::Point(p) => json!({"type": "Point", "coordinates": [p.x(), p.y()]}),
        Geometry::Polygon(poly) => json!({"type": "Polygon", "coordinates": polygon_coords(poly)}),
        Geometry::MultiPolygon(mp) => {
            let coords: Vec<Value> = mp.0.iter().map(polygon_coords).collect();
            json!({"type": "MultiPolygon", "coordinates": coords})
        }
        other => {
            log::warn!("Unsupported geometry kind for GeoJSON export: {other:?}");
            Value::Null
        }
    }
}

fn polygon_coords(poly: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_coords(poly.exterior())];
    rings.extend(poly.interiors().iter().map(ring_coords));
    Value::Array(rings)
}

fn ring_coords(ring: &LineString<f64>) -> Value {
    Value::Array(ring.0.iter().map(|c| json!([c.x, c.y])).collect())
}

fn geometry_from_json(value: &Value) -> Result<Geometry<f64>> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidArgument("geometry missing type".to_string()))?;
    let coords = value
        .get("coordinates")
        .ok_or_else(|| Error::InvalidArgument("geometry missing coordinates".to_string()))?;

    match kind {
        "Point" => {
            let xy = coords.as_array().ok_or_else(|| Error::InvalidArgument("invalid point coordinates".to_string()))?;
            Ok(Geometry::Point(Point::new(num_at(xy, 0)?, num_at(xy, 1)?)))
        }
        "Polygon" => Ok(Geometry::Polygon(polygon_from_json(coords)?)),
        "MultiPolygon" => {
            let polys = coords
                .as_array()
                .ok_or_else(|| Error::InvalidArgument("invalid multipolygon coordinates".to_string()))?
                .iter()
                .map(polygon_from_json)
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon(polys)))
        }
        other => Err(Error::InvalidArgument(format!("unsupported geometry type: {other}"))),
    }
}

fn polygon_from_json(coords: &Value) -> Result<Polygon<f64>> {
    let rings = coords
        .as_array()
        .ok_or_else(|| Error::InvalidArgument("invalid polygon coordinates".to_string()))?;
    let mut line_strings = rings.iter().map(ring_from_json).collect::<Result<Vec<_>>>()?;
    if line_strings.is_empty() {
        return Ok(Polygon::new(LineString::new(vec![]), vec![]));
    }
    let exterior = line_strings.remove(0);
    Ok(Polygon::new(exterior, line_strings))
}

fn ring_from_json(ring: &Value) -> Result<LineString<f64>> {
    let points = ring
        .as_array()
        .ok_or_else(|| Error::InvalidArgument("invalid ring coordinates".to_string()))?
        .iter()
        .map(|pair| {
            let xy = pair.as_array().ok_or_else(|| Error::InvalidArgument("invalid coordinate pair".to_string()))?;
            Ok(Coord {
                x: num_at(xy, 0)?,
                y: num_at(xy, 1)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(points))
}

fn num_at(values: &[Value], index: usize) -> Result<f64> {
    values
        .get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::InvalidArgument("expected numeric coordinate".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_polygon_with_attributes() {
        let dir = std::env::temp_dir().join(format!("geo-geojson-test-{}", std::process::id()));
        let path = dir.join("features.geojson");

        let schema = Schema::new(vec![crate::vector::schema::FieldInfo::new("name", FieldType::String)]);
        let poly = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)]),
            vec![],
        );
        let mut attrs = Attributes::new();
        attrs.insert("name".to_string(), Field::String("parcel-1".to_string()));
        let rows = vec![FeatureRow {
            geometry: Geometry::Polygon(poly),
            attributes: attrs,
        }];

        write(&path, &schema, &rows).unwrap();
        let (read_schema, read_rows) = read(&path).unwrap();

        assert!(read_schema.contains("name"));
        assert_eq!(read_rows.len(), 1);
        assert_eq!(read_rows[0].attributes.get("name").unwrap().as_str(), Some("parcel-1"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
