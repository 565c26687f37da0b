//! Kernel, agent handles and the lifecycle driver

mod context;
mod handle;
mod kernel;
mod lifecycle;
mod registry;

pub use context::AgentContext;
pub use handle::AgentRef;
pub use kernel::Kernel;
pub use registry::{AgentFactory, AgentFactoryRegistry};

pub(crate) use handle::{StepOutcome, StepRequest};
