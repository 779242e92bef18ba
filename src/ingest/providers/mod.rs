// src/ingest/providers/mod.rs
pub mod imgur;
pub mod local_dir;
pub mod reddit;

pub use imgur::ImgurSource;
pub use local_dir::LocalDirSource;
pub use reddit::{RedditOptions, RedditSource};
