//! Provider-specific request builders, shape extractors and normalizers.

pub mod saavn;

pub use saavn::SaavnMediaOrigin;
