pub mod align;
pub mod disjoint_set;
pub mod mesh;
pub mod region;

pub use align::{Alignment, CoordinateFrameAligner};
pub use disjoint_set::DisjointSet;
pub use mesh::{Aabb, Mesh, Ray, RayHit, intersect_triangle};
pub use region::{Plane, RegionExtractor};
