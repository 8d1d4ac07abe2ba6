pub mod anchor;
pub mod blob;
pub mod db;

pub use anchor::{AnchorLog, SledAnchorLog};
pub use blob::{BlobStore, SledBlobStore};
pub use db::StateDb;
