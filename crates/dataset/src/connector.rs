//! The top-level aggregate (C4): owns the vectors/rasters tables (C3) and the bipartite
//! spatial graph (C2) that ties them together, plus the process-wide [`Attrs`] bag. Every
//! add/drop keeps I1-I4 and the `raster_count` aggregate (I3) in lockstep; see
//! `dataset::driver` for the bulk-insert path used by the cutting drivers, which extends
//! the graph incrementally without going through the table-level validation twice.

use std::path::{Path, PathBuf};

use geo::Epsg;
use geo::raster::{RasterDataset, RasterDatasetWriter};
use geo::vector::schema::Field;
use geo_types::Geometry;
use graph::{BipartiteGraph, Color, EdgeData, FeatureName};

use crate::attrs::Attrs;
use crate::labelmaker::LabelMaker;
use crate::table::{Row, Table};
use crate::{Error, Result};

pub const VECTOR_NAME_FIELD: &str = "vector_name";
pub const RASTER_NAME_FIELD: &str = "raster_name";
pub const ORIG_CRS_EPSG_FIELD: &str = "orig_crs_epsg_code";

const RASTERS_SUBDIR: &str = "rasters";
const LABELS_SUBDIR: &str = "labels";
const CONNECTOR_SUBDIR: &str = "connector";

/// The catalog of rasters + vectors + their spatial graph, rooted at `data_dir` on disk
/// (§6 "On-disk layout"). Exactly one `Connector` should ever point at a given `data_dir`
/// at a time (§5 "Shared-resource policy").
pub struct Connector {
    data_dir: PathBuf,
    attrs: Attrs,
    vectors: Table,
    rasters: Table,
    graph: BipartiteGraph,
}

impl Connector {
    /// Creates an empty connector rooted at `data_dir`, nothing is written until [`Connector::save`].
    pub fn from_scratch(data_dir: impl Into<PathBuf>, crs_epsg: Epsg) -> Self {
        Connector {
            data_dir: data_dir.into(),
            attrs: Attrs::new(crs_epsg),
            vectors: Table::new(VECTOR_NAME_FIELD, vec![]),
            rasters: Table::new(RASTER_NAME_FIELD, vec![ORIG_CRS_EPSG_FIELD.to_string()]),
            graph: BipartiteGraph::new(),
        }
    }

    /// Rehydrates a connector previously persisted with [`Connector::save`].
    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let connector_dir = data_dir.join(CONNECTOR_SUBDIR);

        let attrs = Attrs::load(connector_dir.join("attrs.json"))?;
        let vectors = Table::load(connector_dir.join("vectors.geojson"), VECTOR_NAME_FIELD, vec![])?;
        let rasters = Table::load(
            connector_dir.join("rasters.geojson"),
            RASTER_NAME_FIELD,
            vec![ORIG_CRS_EPSG_FIELD.to_string()],
        )?;
        let graph = BipartiteGraph::load(connector_dir.join("graph.json"))?;

        Ok(Connector {
            data_dir,
            attrs,
            vectors,
            rasters,
            graph,
        })
    }

    pub fn save(&self) -> Result<()> {
        let connector_dir = self.connector_dir();
        std::fs::create_dir_all(&connector_dir)?;
        self.vectors.save(connector_dir.join("vectors.geojson"))?;
        self.rasters.save(connector_dir.join("rasters.geojson"))?;
        self.graph.save(connector_dir.join("graph.json"))?;
        self.attrs.save(connector_dir.join("attrs.json"))?;
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn connector_dir(&self) -> PathBuf {
        self.data_dir.join(CONNECTOR_SUBDIR)
    }

    pub fn rasters_dir(&self) -> PathBuf {
        self.data_dir.join(RASTERS_SUBDIR)
    }

    pub fn labels_dir(&self) -> PathBuf {
        self.data_dir.join(LABELS_SUBDIR)
    }

    /// The directories cutters materialize parallel output into, in the order the
    /// cutter contract (§4.4) walks them: the raw rasters directory first, then any
    /// directory (e.g. labels) that may or may not already have a file for a given
    /// source raster.
    pub fn raster_data_dirs(&self) -> Vec<(&'static str, PathBuf)> {
        vec![("rasters", self.rasters_dir()), ("labels", self.labels_dir())]
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        &mut self.attrs
    }

    pub fn crs_epsg(&self) -> Epsg {
        self.attrs.crs_epsg
    }

    pub fn vectors(&self) -> &Table {
        &self.vectors
    }

    pub fn rasters(&self) -> &Table {
        &self.rasters
    }

    pub(crate) fn vectors_mut(&mut self) -> &mut Table {
        &mut self.vectors
    }

    pub(crate) fn rasters_mut(&mut self) -> &mut Table {
        &mut self.rasters
    }

    pub fn graph(&self) -> &BipartiteGraph {
        &self.graph
    }

    // ---- Queries (§4.3 "Query operations (total)") ----------------------------------

    pub fn rasters_containing_vector(&self, v: &FeatureName) -> Result<Vec<FeatureName>> {
        Ok(self.graph.neighbors(v, Color::Vector, Some(EdgeData::Contains))?)
    }

    pub fn vectors_contained_in_raster(&self, r: &FeatureName) -> Result<Vec<FeatureName>> {
        Ok(self.graph.neighbors(r, Color::Raster, Some(EdgeData::Contains))?)
    }

    pub fn rasters_intersecting_vector(&self, v: &FeatureName) -> Result<Vec<FeatureName>> {
        self.union_neighbors(v, Color::Vector)
    }

    pub fn vectors_intersecting_raster(&self, r: &FeatureName) -> Result<Vec<FeatureName>> {
        self.union_neighbors(r, Color::Raster)
    }

    fn union_neighbors(&self, name: &FeatureName, color: Color) -> Result<Vec<FeatureName>> {
        let mut contains = self.graph.neighbors(name, color, Some(EdgeData::Contains))?;
        let intersects = self.graph.neighbors(name, color, Some(EdgeData::Intersects))?;
        contains.extend(intersects);
        Ok(contains)
    }

    pub fn is_vector_contained_in_raster(&self, v: &FeatureName, r: &FeatureName) -> bool {
        self.graph.edge_data(v, Color::Vector, r) == Some(EdgeData::Contains)
    }

    pub fn does_raster_intersect_vector(&self, r: &FeatureName, v: &FeatureName) -> bool {
        self.graph.edge_data(r, Color::Raster, v).is_some()
    }

    pub fn raster_footprint(&self, r: &FeatureName) -> Option<Geometry<f64>> {
        self.rasters.get(r).map(|row| row.geometry.clone())
    }

    pub fn vector_geometry(&self, v: &FeatureName) -> Option<Geometry<f64>> {
        self.vectors.get(v).map(|row| row.geometry.clone())
    }

    fn raster_count(&self, v: &FeatureName) -> i64 {
        self.vectors
            .get(v)
            .and_then(|r| r.attributes.get(&self.attrs.raster_count_col_name))
            .and_then(Field::as_i64)
            .unwrap_or(0)
    }

    fn adjust_raster_count(&mut self, v: &FeatureName, delta: i64) -> Result<()> {
        let col = self.attrs.raster_count_col_name.clone();
        let new_value = self.raster_count(v) + delta;
        self.vectors.set_attribute(v, &col, Field::Integer(new_value))
    }

    /// True if `a` contains `b`, false if disjoint or only intersecting.
    fn classify_edge(a: &Geometry<f64>, b: &Geometry<f64>) -> Result<Option<EdgeData>> {
        if !geo::vector::geom::intersects(a, b)? {
            return Ok(None);
        }
        if geo::vector::geom::contains(a, b)? {
            Ok(Some(EdgeData::Contains))
        } else {
            Ok(Some(EdgeData::Intersects))
        }
    }

    /// Adds a raster vertex to the graph and computes its edges against every current
    /// vector, incrementing `raster_count` for every vector newly `contains`-edged.
    /// Used by both [`Connector::add_to_rasters`] and the cutting drivers (§4.5 step 4c),
    /// which append the row itself separately in bulk.
    pub(crate) fn add_raster_to_graph(&mut self, name: &FeatureName, geometry: &Geometry<f64>) -> Result<()> {
        self.graph.add_vertex(name, Color::Raster);
        let vector_names: Vec<FeatureName> = self.vectors.names().cloned().collect();
        for v in vector_names {
            let vector_geom = self.vectors.get(&v).expect("name came from iteration").geometry.clone();
            if let Some(edge) = Self::classify_edge(geometry, &vector_geom)? {
                self.graph.add_edge(name, Color::Raster, &v, edge, false)?;
                if edge == EdgeData::Contains {
                    self.adjust_raster_count(&v, 1)?;
                }
            }
        }
        Ok(())
    }

    /// Symmetric counterpart used by [`Connector::add_to_vectors`]: computes edges for a
    /// newly-added vector against every current raster.
    fn add_vector_to_graph(&mut self, name: &FeatureName, geometry: &Geometry<f64>) -> Result<()> {
        self.graph.add_vertex(name, Color::Vector);
        let raster_names: Vec<FeatureName> = self.rasters.names().cloned().collect();
        let mut containing_count = 0i64;
        for r in raster_names {
            let raster_geom = self.rasters.get(&r).expect("name came from iteration").geometry.clone();
            if let Some(edge) = Self::classify_edge(&raster_geom, geometry)? {
                self.graph.add_edge(name, Color::Vector, &r, edge, false)?;
                if edge == EdgeData::Contains {
                    containing_count += 1;
                }
            }
        }
        let col = self.attrs.raster_count_col_name.clone();
        self.vectors.set_attribute(name, &col, Field::Integer(containing_count))
    }

    // ---- Add/drop (§4.2, §4.3) --------------------------------------------------------

    /// §4.2 `add_to_rasters`. Returns the names actually appended, in emission order.
    pub fn add_to_rasters<D, W>(&mut self, mut new_rows: Vec<Row>, source_epsg: Epsg, label_maker: Option<&dyn LabelMaker<D, W>>) -> Result<Vec<FeatureName>>
    where
        D: RasterDataset,
        W: RasterDatasetWriter,
    {
        for row in &mut new_rows {
            row.geometry = geo::crs::reproject_geometry(&row.geometry, source_epsg, self.attrs.crs_epsg)?;
        }

        self.rasters.validate_new_rows(&new_rows)?;

        let mut added = Vec::with_capacity(new_rows.len());
        for row in &new_rows {
            self.add_raster_to_graph(&row.name, &row.geometry)?;
            added.push(row.name.clone());
        }
        self.rasters.append(new_rows);

        if let Some(label_maker) = label_maker {
            label_maker.make_labels(self, Some(&added))?;
        }

        Ok(added)
    }

    /// §4.3 `add_to_vectors`. `raster_count` is forced to 0 before the graph pass
    /// recomputes it, regardless of any value the caller supplied.
    pub fn add_to_vectors<D, W>(&mut self, mut new_rows: Vec<Row>, source_epsg: Epsg, label_maker: Option<&dyn LabelMaker<D, W>>) -> Result<Vec<FeatureName>>
    where
        D: RasterDataset,
        W: RasterDatasetWriter,
    {
        let count_col = self.attrs.raster_count_col_name.clone();
        for row in &mut new_rows {
            row.geometry = geo::crs::reproject_geometry(&row.geometry, source_epsg, self.attrs.crs_epsg)?;
            row.attributes.insert(count_col.clone(), Field::Integer(0));
        }

        self.vectors.validate_new_rows(&new_rows)?;

        let mut added = Vec::with_capacity(new_rows.len());
        for row in &new_rows {
            added.push(row.name.clone());
        }
        self.vectors.append(new_rows);
        for name in &added {
            let geometry = self.vectors.get(name).expect("just appended").geometry.clone();
            self.add_vector_to_graph(name, &geometry)?;
        }

        if let Some(label_maker) = label_maker {
            let mut affected = std::collections::HashSet::new();
            for v in &added {
                for r in self.rasters_intersecting_vector(v)? {
                    affected.insert(r);
                }
            }
            let affected: Vec<FeatureName> = affected.into_iter().collect();
            label_maker.recompute_labels(self, &affected)?;
        }

        Ok(added)
    }

    /// §4.2 `drop_rasters`.
    pub fn drop_rasters<D, W>(&mut self, raster_names: &[FeatureName], remove_from_disk: bool, label_maker: Option<&dyn LabelMaker<D, W>>) -> Result<()>
    where
        D: RasterDataset,
        W: RasterDatasetWriter,
    {
        for r in raster_names {
            let contained_vectors = self.vectors_contained_in_raster(r)?;
            for v in &contained_vectors {
                self.adjust_raster_count(v, -1)?;
            }
            self.graph.delete_vertex(r, Color::Raster, true)?;
            self.rasters.remove(r);
        }

        if remove_from_disk {
            for (_, dir) in self.raster_data_dirs() {
                for r in raster_names {
                    let path = dir.join(r.as_str());
                    if path.exists() {
                        std::fs::remove_file(&path)?;
                    }
                }
            }

            if let Some(label_maker) = label_maker {
                label_maker.delete_labels(self, Some(raster_names))?;
            }
        }

        Ok(())
    }

    /// §4.3 `drop_vectors`.
    pub fn drop_vectors<D, W>(&mut self, vector_names: &[FeatureName], label_maker: Option<&dyn LabelMaker<D, W>>) -> Result<()>
    where
        D: RasterDataset,
        W: RasterDatasetWriter,
    {
        let mut affected_rasters = std::collections::HashSet::new();
        for v in vector_names {
            for r in self.rasters_intersecting_vector(v)? {
                affected_rasters.insert(r);
            }
            self.graph.delete_vertex(v, Color::Vector, true)?;
            self.vectors.remove(v);
        }

        if let Some(label_maker) = label_maker {
            let affected: Vec<FeatureName> = affected_rasters.into_iter().collect();
            label_maker.recompute_labels(self, &affected)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::raster::MemoryRasterDataset;
    use geo::vector::schema::Attributes;
    use geo_types::{LineString, Polygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(x0, y0), (x0, y1), (x1, y1), (x1, y0), (x0, y0)]),
            vec![],
        ))
    }

    fn row(name: &str, geom: Geometry<f64>) -> Row {
        Row::new(name, geom, Attributes::new())
    }

    /// S1 from §8: add vectors then overlapping rasters, check edges and raster_count.
    #[test]
    fn scenario_s1_add_then_overlap() {
        let mut c = Connector::from_scratch(std::env::temp_dir().join("s1-unused"), Epsg::new(4326));

        c.add_to_vectors::<MemoryRasterDataset, MemoryRasterDataset>(
            vec![
                row("p1", square(0.0, 0.0, 1.0, 1.0)),
                row("p2", square(4.0, 4.0, 5.0, 5.0)),
                row("p3", square(-2.0, -2.0, -1.0, -1.0)),
            ],
            Epsg::new(4326),
            None,
        )
        .unwrap();

        c.add_to_rasters::<MemoryRasterDataset, MemoryRasterDataset>(
            vec![row("r1", square(-0.5, -0.5, 6.0, 6.0)), row("r2", square(-1.5, -1.5, 0.5, 0.5))],
            Epsg::new(4326),
            None,
        )
        .unwrap();

        let p1 = FeatureName::from("p1");
        let p2 = FeatureName::from("p2");
        let p3 = FeatureName::from("p3");
        let r1 = FeatureName::from("r1");
        let r2 = FeatureName::from("r2");

        assert_eq!(c.graph().edge_data(&p1, Color::Vector, &r1), Some(EdgeData::Contains));
        assert_eq!(c.graph().edge_data(&p2, Color::Vector, &r1), Some(EdgeData::Contains));
        assert_eq!(c.graph().edge_data(&p1, Color::Vector, &r2), Some(EdgeData::Intersects));
        assert_eq!(c.graph().edge_data(&p3, Color::Vector, &r2), Some(EdgeData::Intersects));

        assert_eq!(c.raster_count(&p1), 1);
        assert_eq!(c.raster_count(&p2), 1);
        assert_eq!(c.raster_count(&p3), 0);
    }

    /// S2 from §8: dropping r1 after S1 updates the aggregate and residual edges.
    #[test]
    fn scenario_s2_drop_with_aggregate_update() {
        let mut c = Connector::from_scratch(std::env::temp_dir().join("s2-unused"), Epsg::new(4326));
        c.add_to_vectors::<MemoryRasterDataset, MemoryRasterDataset>(
            vec![
                row("p1", square(0.0, 0.0, 1.0, 1.0)),
                row("p2", square(4.0, 4.0, 5.0, 5.0)),
                row("p3", square(-2.0, -2.0, -1.0, -1.0)),
            ],
            Epsg::new(4326),
            None,
        )
        .unwrap();
        c.add_to_rasters::<MemoryRasterDataset, MemoryRasterDataset>(
            vec![row("r1", square(-0.5, -0.5, 6.0, 6.0)), row("r2", square(-1.5, -1.5, 0.5, 0.5))],
            Epsg::new(4326),
            None,
        )
        .unwrap();

        c.drop_rasters::<MemoryRasterDataset, MemoryRasterDataset>(&[FeatureName::from("r1")], false, None).unwrap();

        let p1 = FeatureName::from("p1");
        let p2 = FeatureName::from("p2");
        let p3 = FeatureName::from("p3");
        let r2 = FeatureName::from("r2");

        assert_eq!(c.graph().edge_data(&p1, Color::Vector, &r2), Some(EdgeData::Intersects));
        assert_eq!(c.graph().edge_data(&p3, Color::Vector, &r2), Some(EdgeData::Intersects));
        assert!(!c.graph().contains_vertex(&FeatureName::from("r1"), Color::Raster));

        assert_eq!(c.raster_count(&p1), 0);
        assert_eq!(c.raster_count(&p2), 0);
        assert_eq!(c.raster_count(&p3), 0);
    }

    /// S3 from §8: round-trip through save/from_data_dir preserves tables and graph.
    #[test]
    fn scenario_s3_round_trip() {
        let dir = std::env::temp_dir().join(format!("dataset-connector-s3-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut c = Connector::from_scratch(&dir, Epsg::new(4326));
        c.add_to_vectors::<MemoryRasterDataset, MemoryRasterDataset>(vec![row("p1", square(0.0, 0.0, 1.0, 1.0))], Epsg::new(4326), None).unwrap();
        c.add_to_rasters::<MemoryRasterDataset, MemoryRasterDataset>(vec![row("r1", square(-0.5, -0.5, 6.0, 6.0))], Epsg::new(4326), None).unwrap();
        c.save().unwrap();

        let reloaded = Connector::from_data_dir(&dir).unwrap();
        assert_eq!(reloaded.vectors().len(), c.vectors().len());
        assert_eq!(reloaded.rasters().len(), c.rasters().len());
        assert!(reloaded.graph().really_undirected());
        assert_eq!(
            reloaded.graph().edge_data(&FeatureName::from("p1"), Color::Vector, &FeatureName::from("r1")),
            Some(EdgeData::Contains)
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn add_to_rasters_rejects_duplicate_input() {
        let mut c = Connector::from_scratch(std::env::temp_dir().join("dup-unused"), Epsg::new(4326));
        let result = c.add_to_rasters::<MemoryRasterDataset, MemoryRasterDataset>(
            vec![row("r1", square(0.0, 0.0, 1.0, 1.0)), row("r1", square(1.0, 1.0, 2.0, 2.0))],
            Epsg::new(4326),
            None,
        );
        assert!(matches!(result, Err(Error::DuplicateInput(_))));
    }

    #[test]
    fn drop_vectors_recomputes_raster_intersections_without_touching_raster_count() {
        let mut c = Connector::from_scratch(std::env::temp_dir().join("dv-unused"), Epsg::new(4326));
        c.add_to_vectors::<MemoryRasterDataset, MemoryRasterDataset>(vec![row("p1", square(0.0, 0.0, 1.0, 1.0))], Epsg::new(4326), None).unwrap();
        c.add_to_rasters::<MemoryRasterDataset, MemoryRasterDataset>(vec![row("r1", square(-0.5, -0.5, 2.0, 2.0))], Epsg::new(4326), None).unwrap();

        c.drop_vectors::<MemoryRasterDataset, MemoryRasterDataset>(&[FeatureName::from("p1")], None).unwrap();
        assert!(!c.graph().contains_vertex(&FeatureName::from("p1"), Color::Vector));
        assert!(c.graph().contains_vertex(&FeatureName::from("r1"), Color::Raster));
        assert_eq!(c.vectors_contained_in_raster(&FeatureName::from("r1")).unwrap().len(), 0);
    }
}
