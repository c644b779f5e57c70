pub mod command_probe;
pub mod host;

pub use command_probe::{CommandProbe, ProbeError};
pub use host::SysinfoSampler;
