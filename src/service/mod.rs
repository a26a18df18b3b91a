pub mod orchestrator;
pub mod processor;
pub mod pull;
pub mod queue;
pub mod retry;
