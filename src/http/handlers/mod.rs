pub mod metadata;
pub mod stream;
