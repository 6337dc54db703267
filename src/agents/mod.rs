pub mod agent;
pub mod orchestrator;


pub use agent::{Agent, AgentId, AgentMetrics, AgentStatus, ScrapingAgent};
pub use orchestrator::{AgentOrchestrator, OrchestratorStatus, RunAssignment, RunReport};
