//! Everything touching the external package registry: the wire shapes
//! (`document`), the trait/HTTP implementation (`client`), and the
//! promise-caching layer in front of both (`fetcher`).

pub mod client;
pub mod document;
pub mod fetcher;

pub use client::{HttpRegistryClient, RegistryClient};
pub use document::MigrationDocument;
pub use fetcher::Fetcher;
