//! Core types and pure logic shared by providers and the batch runner

pub mod batch;
pub mod config;
pub mod error;
pub mod links;
pub mod log;
pub mod product;
pub mod series;
pub mod text;

// Re-export main types for cleaner imports
pub use error::ScrapeError;
pub use product::{ProductProvider, ProductRecord, ReturnWindow, Returns, WindowReturns};
