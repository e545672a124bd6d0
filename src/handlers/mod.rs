pub mod digest;
pub mod download;
pub mod meta;
pub mod upload;
