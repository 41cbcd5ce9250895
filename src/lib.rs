pub mod config;
pub mod core;
pub mod utils;

pub use crate::core::device::Device;
pub use crate::core::error::FreeGpusError;
pub use crate::core::report::{Mode, Report};
pub use crate::core::select::OnlyUse;
pub use crate::core::smi::{DeviceSource, NvidiaSmi};
pub use crate::core::users::{SystemUsers, UserResolver};
