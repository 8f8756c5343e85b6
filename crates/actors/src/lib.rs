pub mod hyprland;
pub mod registry;
pub mod system;
pub mod traits;

pub use registry::{ActorRegistry, RegistryError};
pub use traits::{Actor, ActorError, ActorKey, CapabilityDescriptor, Parameters};

use std::sync::Arc;

/// Registers the built-in `system.*` and `hyprland.*` actors.
pub fn register_builtin(registry: &mut ActorRegistry) -> Result<(), RegistryError> {
    registry
        .register(
            system::WaitActor::key(),
            Arc::new(system::WaitActor),
            system::WaitActor::capability(),
            false,
        )?
        .register(
            system::ExecActor::key(),
            Arc::new(system::ExecActor),
            system::ExecActor::capability(),
            false,
        )?;

    for dispatch in hyprland::Dispatch::ALL {
        registry.register(
            dispatch.key(),
            Arc::new(hyprland::HyprctlActor::new(dispatch)),
            dispatch.capability(),
            false,
        )?;
    }

    Ok(())
}
