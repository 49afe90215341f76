pub mod backend;
pub mod file;
mod pump;
pub mod synthetic;

pub use backend::{CaptureDevice, CaptureDeviceFactory, CaptureProfile, DeviceSource, RawFrame};
pub use file::FileDevice;
pub use synthetic::SyntheticDevice;
