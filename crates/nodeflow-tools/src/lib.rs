pub mod builtin;
pub mod presets;
pub mod registry;
pub mod simulator;

pub use presets::PresetCatalog;
pub use registry::{ProviderRegistry, SimProvider};
pub use simulator::SimulatorHub;
