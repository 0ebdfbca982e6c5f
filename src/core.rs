pub mod aggregate;
pub mod plan;
pub mod scenario;
pub mod slot;
pub mod window;
