//! Spatial meshes: one sub-mesh per domain, keyed by an ordered domain tuple.
//!
//! Only single-domain, non-ghost entries are primary. Ghost cells are rebuilt
//! whenever a mesh is constructed and composite (multi-domain) entries are derived
//! on demand by `Mesh::combine`.

use crate::codec::float;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered tuple of domain names identifying one sub-mesh.
pub type DomainKey = Vec<String>;

const GHOST_MARKER: &str = "ghost cell";

pub fn domain_key<S: Into<String>>(domains: impl IntoIterator<Item = S>) -> DomainKey {
    domains.into_iter().map(Into::into).collect()
}

/// True for keys that are regenerated rather than persisted.
pub fn is_derived_key(key: &DomainKey) -> bool {
    key.len() != 1 || key.iter().any(|d| d.contains(GHOST_MARKER))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordSys {
    Cartesian,
    CylindricalPolar,
    SphericalPolar,
}

/// How the edges of a one-dimensional sub-mesh were generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spacing {
    Uniform,
    Exponential,
    Chebyshev,
    UserSupplied,
    /// Ghost cells and combined meshes carry no generator of their own.
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubMesh0D {
    #[serde(with = "float::real")]
    pub position: f64,
    pub coord_sys: CoordSys,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh1D {
    pub spacing: Spacing,
    pub edges: Vec<f64>,
    pub coord_sys: CoordSys,
}

impl SubMesh1D {
    pub fn new(spacing: Spacing, edges: Vec<f64>, coord_sys: CoordSys) -> Result<Self, String> {
        if edges.len() < 2 {
            return Err(format!("A 1D sub-mesh needs at least two edges, got {}", edges.len()));
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err("Sub-mesh edges must be strictly increasing".to_string());
        }
        Ok(Self { spacing, edges, coord_sys })
    }

    /// `npts + 1` evenly spaced edges on `[start, end]`.
    pub fn uniform(start: f64, end: f64, npts: usize, coord_sys: CoordSys) -> Result<Self, String> {
        if npts == 0 {
            return Err("A uniform sub-mesh needs at least one point".to_string());
        }
        let h = (end - start) / npts as f64;
        let edges = (0..=npts).map(|i| start + h * i as f64).collect();
        Self::new(Spacing::Uniform, edges, coord_sys)
    }

    pub fn npts(&self) -> usize {
        self.edges.len() - 1
    }

    /// Cell centres.
    pub fn nodes(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    fn ghost_pair(&self) -> (SubMesh1D, SubMesh1D) {
        let n = self.edges.len();
        let (first, second) = (self.edges[0], self.edges[1]);
        let (last, penultimate) = (self.edges[n - 1], self.edges[n - 2]);
        let left = SubMesh1D {
            spacing: Spacing::Generic,
            edges: vec![2.0 * first - second, first],
            coord_sys: self.coord_sys,
        };
        let right = SubMesh1D {
            spacing: Spacing::Generic,
            edges: vec![last, 2.0 * last - penultimate],
            coord_sys: self.coord_sys,
        };
        (left, right)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubMesh {
    Point(SubMesh0D),
    Line(SubMesh1D),
}

impl SubMesh {
    pub fn coord_sys(&self) -> CoordSys {
        match self {
            SubMesh::Point(p) => p.coord_sys,
            SubMesh::Line(l) => l.coord_sys,
        }
    }

    pub fn npts(&self) -> usize {
        match self {
            SubMesh::Point(_) => 1,
            SubMesh::Line(l) => l.npts(),
        }
    }
}

/// A mapping from domain tuple to sub-mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    sub_meshes: BTreeMap<DomainKey, SubMesh>,
    base_domains: Vec<String>,
}

impl Mesh {
    /// Builds a mesh from its primary sub-meshes and generates ghost cells.
    pub fn new(primary: impl IntoIterator<Item = (String, SubMesh)>) -> Self {
        let mut mesh = Mesh::default();
        for (domain, sub_mesh) in primary {
            mesh.base_domains.push(domain.clone());
            mesh.sub_meshes.insert(vec![domain], sub_mesh);
        }
        mesh.add_ghost_meshes();
        mesh
    }

    fn add_ghost_meshes(&mut self) {
        let mut ghosts = Vec::new();
        for (key, sub_mesh) in &self.sub_meshes {
            if is_derived_key(key) {
                continue;
            }
            if let SubMesh::Line(line) = sub_mesh {
                let (left, right) = line.ghost_pair();
                ghosts.push((vec![format!("{}_left {}", key[0], GHOST_MARKER)], SubMesh::Line(left)));
                ghosts.push((vec![format!("{}_right {}", key[0], GHOST_MARKER)], SubMesh::Line(right)));
            }
        }
        self.sub_meshes.extend(ghosts);
    }

    /// Concatenates the sub-meshes of adjacent domains and registers the result
    /// under the composite key.
    pub fn combine(&mut self, domains: &[&str]) -> Result<&SubMesh, String> {
        let key = domain_key(domains.iter().copied());
        if !self.sub_meshes.contains_key(&key) {
            let combined = self.combined_sub_mesh(domains)?;
            self.sub_meshes.insert(key.clone(), combined);
        }
        self.sub_meshes.get(&key).ok_or_else(|| format!("Composite key {:?} vanished", key))
    }

    fn combined_sub_mesh(&self, domains: &[&str]) -> Result<SubMesh, String> {
        let mut edges: Vec<f64> = Vec::new();
        let mut coord_sys = None;
        for domain in domains {
            let line = match self.get(&[*domain]) {
                Some(SubMesh::Line(line)) => line,
                Some(SubMesh::Point(_)) => return Err(format!("Cannot combine 0D sub-mesh '{}'", domain)),
                None => return Err(format!("Unknown domain '{}'", domain)),
            };
            match coord_sys {
                None => coord_sys = Some(line.coord_sys),
                Some(c) if c != line.coord_sys => {
                    return Err(format!("Domain '{}' uses a different coordinate system", domain));
                }
                Some(_) => {}
            }
            match edges.last() {
                None => edges.extend_from_slice(&line.edges),
                Some(&last) => {
                    if (last - line.edges[0]).abs() > 1e-12 * last.abs().max(1.0) {
                        return Err(format!("Domain '{}' is not adjacent to the previous domain", domain));
                    }
                    edges.extend_from_slice(&line.edges[1..]);
                }
            }
        }
        let coord_sys = coord_sys.ok_or_else(|| "Cannot combine an empty list of domains".to_string())?;
        SubMesh1D::new(Spacing::Generic, edges, coord_sys).map(SubMesh::Line)
    }

    pub fn insert(&mut self, key: DomainKey, sub_mesh: SubMesh) {
        self.sub_meshes.insert(key, sub_mesh);
    }

    pub fn get(&self, domains: &[&str]) -> Option<&SubMesh> {
        self.sub_meshes.get(&domain_key(domains.iter().copied()))
    }

    pub fn base_domains(&self) -> &[String] {
        &self.base_domains
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DomainKey, &SubMesh)> {
        self.sub_meshes.iter()
    }

    /// The entries that are persisted: single-domain and not a ghost cell.
    pub fn primary_entries(&self) -> impl Iterator<Item = (&String, &SubMesh)> {
        self.sub_meshes.iter().filter(|(k, _)| !is_derived_key(k)).map(|(k, v)| (&k[0], v))
    }

    pub fn len(&self) -> usize {
        self.sub_meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_meshes.is_empty()
    }

    /// Reassembles a mesh from persisted parts. Ghost cells are regenerated.
    pub(crate) fn from_parts(base_domains: Vec<String>, sub_meshes: BTreeMap<String, SubMesh>) -> Self {
        let mut mesh = Mesh::default();
        for (domain, sub_mesh) in sub_meshes {
            mesh.sub_meshes.insert(vec![domain], sub_mesh);
        }
        mesh.base_domains = base_domains;
        mesh.add_ghost_meshes();
        mesh
    }
}
