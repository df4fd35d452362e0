//! 核心编排层：错误类型、过程事件、Run 轮询、会话 id 持久化、主编排器

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod poller;
pub mod session_store;

pub use error::AgentError;
pub use events::RunEvent;
pub use orchestrator::{AssistantOrchestrator, AssistantProfile};
pub use poller::{InstantSleeper, PollConfig, RunOutput, RunPoller, Sleeper, TokioSleeper};
pub use session_store::{FileSessionStore, InMemorySessionStore, SessionIds, SessionStore};
