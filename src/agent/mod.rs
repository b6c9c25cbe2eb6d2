pub mod context;
pub mod ledger;
pub mod orchestrator;
pub mod prompts;
