mod join;
mod params;
mod sql;

pub use join::*;
pub use params::*;
pub use sql::*;
