//! The live object model: expression nodes, events, meshes, models, and the
//! registry that maps persisted type tags back onto them.
pub mod event;
pub mod mesh;
pub mod model;
pub mod registry;
pub mod types;

pub use event::{Event, EventType};
pub use mesh::{CoordSys, DomainKey, Mesh, Spacing, SubMesh, SubMesh0D, SubMesh1D};
pub use model::{Model, ModelKind, ModelParts};
pub use registry::{Shell, SubMeshShell, SymbolShell, TypeRegistry};
pub use types::{BinaryOp, Children, DenseMatrix, Domains, MathFunction, SpatialOp, Symbol, SymbolKind, YSlice};
