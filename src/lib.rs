pub mod classifier;
pub mod errors;
pub mod fingerprint;
pub mod framework;
pub mod models;
pub mod orchestrator;
pub mod probes;
pub mod scoring;
pub mod transport;

// Re-export commonly used items
pub use classifier::*;
pub use errors::*;
pub use fingerprint::*;
pub use framework::*;
pub use models::*;
pub use orchestrator::*;
pub use probes::*;
pub use scoring::*;
pub use transport::*;
