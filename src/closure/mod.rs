//! Dependency closure over reference fields

mod resolver;

pub use resolver::ClosureResolver;
