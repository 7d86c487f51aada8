//! Tool resolver implementations

mod static_resolver;

pub use static_resolver::StaticToolResolver;
