pub mod error;
pub mod feature;
pub mod normal;
pub mod point;
pub mod point_cloud;
pub mod search;

pub use self::error::{Error, Result};
