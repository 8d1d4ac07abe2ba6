pub mod accounts;
pub mod registry;

pub use accounts::AccountDirectory;
pub use registry::{DeviceRegistry, RegisterDevice};
