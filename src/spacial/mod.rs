//! Region classification: coordinates, regions, the bounding-box locator,
//! and the poly-file format used to build region polygons.

pub mod coords;
pub mod index;
pub mod polyfile;
pub mod region;

pub use coords::Coordinates;
pub use index::RegionLocator;
pub use region::Region;
