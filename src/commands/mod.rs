// Manifest lifecycle: plan, apply, teardown
pub mod lifecycle;

// Introspection
pub mod resources;
