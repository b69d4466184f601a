//! Internal data structures: the DIE arena, attribute values, location
//! operations, and source path helpers.

pub mod die;
pub mod loc;
pub mod path;
