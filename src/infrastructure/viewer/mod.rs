pub mod viewer;

pub use viewer::{Identity, ViewerContext};
