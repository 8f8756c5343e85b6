pub mod hyprland;
pub mod system;

pub use hyprland::HyprlandSnapshotProvider;
pub use system::SystemSnapshotProvider;
