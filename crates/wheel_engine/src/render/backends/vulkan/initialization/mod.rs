//! Instance, device and context setup

pub mod context;
pub mod device;
pub mod instance;
