pub mod accumulator;
pub mod error;
pub mod executor;
pub mod history;
pub mod images;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod session;

pub use accumulator::StreamState;
pub use error::EngineError;
pub use executor::{ToolExecution, ToolExecutor};
pub use registry::{RegistryError, ToolFilter, ToolRegistry};
pub use runner::{RunnerConfig, TurnOutcome, TurnParams, TurnReport, TurnRunner};
pub use scheduler::UpdateScheduler;
pub use session::SessionController;
