//! Fixed-depth octrees over integer voxel keys.

mod adjacency;
mod base;
mod iter;
mod node;
mod point_cloud;

pub use self::{adjacency::*, base::*, iter::*, point_cloud::*};
