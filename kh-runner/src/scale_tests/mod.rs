//! Built-in scale tests.
//!
//! Both run their commands on the central node, where `kubectl` talks to the
//! kind cluster.

mod density_light;
mod node_ready;

pub use density_light::{DensityLight, DensityLightCfg};
pub use node_ready::{NodeReady, NodeReadyCfg};
