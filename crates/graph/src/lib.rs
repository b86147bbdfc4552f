//! Two-colored multigraph (vector-vertices vs raster-vertices) with labeled edges,
//! the incremental bipartite spatial index underlying the connector's `contains`/`intersects`
//! relation between raster footprints and vector geometries.

mod error;
mod name;

use std::collections::{HashMap, HashSet};
use std::path::Path;

pub use error::{Error, Result};
pub use name::{Color, FeatureName};

/// Topological relation an edge carries. `contains` implies `intersects`; the graph itself
/// stores at most one of the two per (vector, raster) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeData {
    Contains,
    Intersects,
}

/// The bipartite spatial graph: two adjacency maps, one rooted at vector vertices and one
/// at raster vertices, kept in lockstep so every edge is represented from both sides. Vertex
/// identity is purely name-based — no row pointers are ever embedded here (see design note
/// on cyclic references).
#[derive(Debug, Clone, Default)]
pub struct BipartiteGraph {
    vector_adjacency: HashMap<FeatureName, HashMap<FeatureName, EdgeData>>,
    raster_adjacency: HashMap<FeatureName, HashMap<FeatureName, EdgeData>>,
}

impl BipartiteGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn adjacency(&self, color: Color) -> &HashMap<FeatureName, HashMap<FeatureName, EdgeData>> {
        match color {
            Color::Vector => &self.vector_adjacency,
            Color::Raster => &self.raster_adjacency,
        }
    }

    fn adjacency_mut(&mut self, color: Color) -> &mut HashMap<FeatureName, HashMap<FeatureName, EdgeData>> {
        match color {
            Color::Vector => &mut self.vector_adjacency,
            Color::Raster => &mut self.raster_adjacency,
        }
    }

    fn opposite(color: Color) -> Color {
        match color {
            Color::Vector => Color::Raster,
            Color::Raster => Color::Vector,
        }
    }

    /// Idempotent: a no-op (with a debug note) if the vertex is already present.
    pub fn add_vertex(&mut self, name: &FeatureName, color: Color) {
        if self.adjacency(color).contains_key(name) {
            log::debug!("Vertex {name} already present in graph, skipping add_vertex");
            return;
        }
        self.adjacency_mut(color).insert(name.clone(), HashMap::new());
    }

    pub fn contains_vertex(&self, name: &FeatureName, color: Color) -> bool {
        self.adjacency(color).contains_key(name)
    }

    /// Fails with [`Error::EdgeExists`] if the edge is already present and `force` is false.
    /// Creates missing endpoints. Inserts the mirror edge on the opposite adjacency map too.
    pub fn add_edge(&mut self, u: &FeatureName, color_u: Color, v: &FeatureName, data: EdgeData, force: bool) -> Result {
        self.add_vertex(u, color_u);
        self.add_vertex(v, Self::opposite(color_u));

        if !force && self.adjacency(color_u).get(u).and_then(|n| n.get(v)).is_some() {
            return Err(Error::EdgeExists(u.clone(), v.clone()));
        }

        self.adjacency_mut(color_u).get_mut(u).expect("just inserted").insert(v.clone(), data);
        self.adjacency_mut(Self::opposite(color_u))
            .get_mut(v)
            .expect("just inserted")
            .insert(u.clone(), data);
        Ok(())
    }

    /// Removes the vertex and all incident edges on both sides. Fails with
    /// [`Error::VertexHasEdges`] if `force_with_edges` is false and the vertex has any edge.
    pub fn delete_vertex(&mut self, name: &FeatureName, color: Color, force_with_edges: bool) -> Result {
        let Some(neighbors) = self.adjacency(color).get(name).cloned() else {
            return Err(Error::UnknownVertex(name.clone()));
        };

        if !force_with_edges && !neighbors.is_empty() {
            return Err(Error::VertexHasEdges(name.clone()));
        }

        for neighbor in neighbors.keys() {
            if let Some(map) = self.adjacency_mut(Self::opposite(color)).get_mut(neighbor) {
                map.remove(name);
            }
        }
        self.adjacency_mut(color).remove(name);
        Ok(())
    }

    /// No-op if the edge is absent; removes both directions otherwise.
    pub fn delete_edge(&mut self, u: &FeatureName, color_u: Color, v: &FeatureName) -> Result {
        if let Some(map) = self.adjacency_mut(color_u).get_mut(u) {
            map.remove(v);
        }
        if let Some(map) = self.adjacency_mut(Self::opposite(color_u)).get_mut(v) {
            map.remove(u);
        }
        Ok(())
    }

    /// Opposite-color neighbors of `v`, optionally restricted to one edge label.
    pub fn neighbors(&self, v: &FeatureName, color_v: Color, edge_data_filter: Option<EdgeData>) -> Result<Vec<FeatureName>> {
        let map = self.adjacency(color_v).get(v).ok_or_else(|| Error::UnknownVertex(v.clone()))?;
        Ok(map
            .iter()
            .filter(|(_, data)| edge_data_filter.is_none_or(|filter| **data == filter))
            .map(|(name, _)| name.clone())
            .collect())
    }

    pub fn edge_data(&self, u: &FeatureName, color_u: Color, v: &FeatureName) -> Option<EdgeData> {
        self.adjacency(color_u).get(u)?.get(v).copied()
    }

    /// Self-check used by tests: every forward edge must have a mirror with identical data.
    pub fn really_undirected(&self) -> bool {
        let mirrors_ok = |from: &HashMap<FeatureName, HashMap<FeatureName, EdgeData>>, to: &HashMap<FeatureName, HashMap<FeatureName, EdgeData>>| {
            from.iter().all(|(u, edges)| edges.iter().all(|(v, data)| to.get(v).and_then(|m| m.get(u)) == Some(data)))
        };
        mirrors_ok(&self.vector_adjacency, &self.raster_adjacency) && mirrors_ok(&self.raster_adjacency, &self.vector_adjacency)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let doc = GraphDocument {
            vector_features: serialize_adjacency(&self.vector_adjacency),
            raster_imgs: serialize_adjacency(&self.raster_adjacency),
        };
        std::fs::write(path, serde_json::to_vec_pretty(&doc)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let doc: GraphDocument = serde_json::from_str(&contents)?;

        let graph = BipartiteGraph {
            vector_adjacency: deserialize_adjacency(&doc.vector_features),
            raster_adjacency: deserialize_adjacency(&doc.raster_imgs),
        };

        if !graph.really_undirected() {
            return Err(Error::CorruptGraph(format!("{}: edges are not symmetric", path.as_ref().display())));
        }
        Ok(graph)
    }

    pub fn vector_vertices(&self) -> impl Iterator<Item = &FeatureName> {
        self.vector_adjacency.keys()
    }

    pub fn raster_vertices(&self) -> impl Iterator<Item = &FeatureName> {
        self.raster_adjacency.keys()
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct GraphDocument {
    vector_features: HashMap<String, HashMap<String, EdgeData>>,
    raster_imgs: HashMap<String, HashMap<String, EdgeData>>,
}

fn serialize_adjacency(map: &HashMap<FeatureName, HashMap<FeatureName, EdgeData>>) -> HashMap<String, HashMap<String, EdgeData>> {
    map.iter()
        .map(|(name, edges)| (name.to_string(), edges.iter().map(|(n, d)| (n.to_string(), *d)).collect()))
        .collect()
}

fn deserialize_adjacency(map: &HashMap<String, HashMap<String, EdgeData>>) -> HashMap<FeatureName, HashMap<FeatureName, EdgeData>> {
    map.iter()
        .map(|(name, edges)| {
            (
                FeatureName::from(name.as_str()),
                edges.iter().map(|(n, d)| (FeatureName::from(n.as_str()), *d)).collect(),
            )
        })
        .collect()
}

/// Total count, by color, of vertices referenced in `names` that exist in the graph.
pub fn existing(graph: &BipartiteGraph, names: &[FeatureName], color: Color) -> HashSet<FeatureName> {
    names.iter().filter(|n| graph.contains_vertex(n, color)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> FeatureName {
        FeatureName::from(s)
    }

    #[test]
    fn add_vertex_is_idempotent() {
        let mut g = BipartiteGraph::new();
        g.add_vertex(&n("p1"), Color::Vector);
        g.add_vertex(&n("p1"), Color::Vector);
        assert!(g.contains_vertex(&n("p1"), Color::Vector));
    }

    #[test]
    fn add_edge_creates_mirror() {
        let mut g = BipartiteGraph::new();
        g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Contains, false).unwrap();
        assert_eq!(g.edge_data(&n("p1"), Color::Vector, &n("r1")), Some(EdgeData::Contains));
        assert_eq!(g.edge_data(&n("r1"), Color::Raster, &n("p1")), Some(EdgeData::Contains));
        assert!(g.really_undirected());
    }

    #[test]
    fn add_edge_without_force_rejects_conflicting_relabel() {
        let mut g = BipartiteGraph::new();
        g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Contains, false).unwrap();
        let result = g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Intersects, false);
        assert!(matches!(result, Err(Error::EdgeExists(_, _))));
    }

    #[test]
    fn add_edge_without_force_rejects_any_existing_edge() {
        let mut g = BipartiteGraph::new();
        g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Contains, false).unwrap();
        let result = g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Contains, false);
        assert!(matches!(result, Err(Error::EdgeExists(_, _))));
    }

    #[test]
    fn add_edge_with_force_overwrites() {
        let mut g = BipartiteGraph::new();
        g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Contains, false).unwrap();
        g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Intersects, true).unwrap();
        assert_eq!(g.edge_data(&n("p1"), Color::Vector, &n("r1")), Some(EdgeData::Intersects));
        assert!(g.really_undirected());
    }

    #[test]
    fn delete_vertex_removes_incident_edges() {
        let mut g = BipartiteGraph::new();
        g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Contains, false).unwrap();
        g.delete_vertex(&n("p1"), Color::Vector, true).unwrap();
        assert!(!g.contains_vertex(&n("p1"), Color::Vector));
        assert_eq!(g.neighbors(&n("r1"), Color::Raster, None).unwrap().len(), 0);
    }

    #[test]
    fn delete_vertex_with_edges_fails_without_force() {
        let mut g = BipartiteGraph::new();
        g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Contains, false).unwrap();
        let result = g.delete_vertex(&n("p1"), Color::Vector, false);
        assert!(matches!(result, Err(Error::VertexHasEdges(_))));
    }

    #[test]
    fn neighbors_filtered_by_edge_label() {
        let mut g = BipartiteGraph::new();
        g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Contains, false).unwrap();
        g.add_edge(&n("p1"), Color::Vector, &n("r2"), EdgeData::Intersects, false).unwrap();

        let contains_only = g.neighbors(&n("p1"), Color::Vector, Some(EdgeData::Contains)).unwrap();
        assert_eq!(contains_only, vec![n("r1")]);

        let all = g.neighbors(&n("p1"), Color::Vector, None).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn round_trips_through_json() {
        let dir = std::env::temp_dir().join(format!("graph-test-{}", std::process::id()));
        let path = dir.join("graph.json");

        let mut g = BipartiteGraph::new();
        g.add_edge(&n("p1"), Color::Vector, &n("r1"), EdgeData::Contains, false).unwrap();
        g.add_edge(&n("p1"), Color::Vector, &n("r2"), EdgeData::Intersects, false).unwrap();
        g.save(&path).unwrap();

        let loaded = BipartiteGraph::load(&path).unwrap();
        assert_eq!(loaded.edge_data(&n("p1"), Color::Vector, &n("r1")), Some(EdgeData::Contains));
        assert_eq!(loaded.edge_data(&n("p1"), Color::Vector, &n("r2")), Some(EdgeData::Intersects));
        assert!(loaded.really_undirected());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unknown_vertex_query_errors() {
        let g = BipartiteGraph::new();
        assert!(matches!(g.neighbors(&n("missing"), Color::Vector, None), Err(Error::UnknownVertex(_))));
    }
}
