pub mod virsh;

use crate::config::LoadedConfig;
use crate::error::NodeboxError;
use crate::host::SystemHost;
use crate::paths::HostPaths;
use crate::progress::OutputMode;

#[allow(async_fn_in_trait)] // trait is internal-only
pub trait Backend {
    async fn create(&self, config: &LoadedConfig) -> Result<(), NodeboxError>;
    async fn start(&self, config: &LoadedConfig) -> Result<(), NodeboxError>;
    async fn stop(&self, config: &LoadedConfig) -> Result<(), NodeboxError>;
    async fn delete(&self, config: &LoadedConfig) -> Result<(), NodeboxError>;
    async fn status(&self, config: &LoadedConfig) -> Result<(), NodeboxError>;
}

pub fn create_backend(paths: HostPaths, mode: OutputMode) -> virsh::VirshBackend<SystemHost> {
    virsh::VirshBackend::new(SystemHost, paths, mode)
}
