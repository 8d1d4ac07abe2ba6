pub mod engine;
pub mod schema;

pub use engine::{AttestationEngine, CreateAttestation, Created, Retrieved, SubmitAttestation};
pub use schema::SchemaRegistry;
