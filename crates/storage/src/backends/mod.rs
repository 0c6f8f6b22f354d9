//! Storage backend implementations.

pub mod filesystem;
pub mod s3;

pub use filesystem::FilesystemBackend;
pub use s3::S3Backend;
