//! sysagent core library: turn a natural-language request into an AI-suggested
//! command plan and run it behind an allowlist, with per-command deadlines.

pub mod agent;
pub mod allowlist;
pub mod config;
pub mod exec;
pub mod llm;
pub mod plan;
pub mod prompt;
pub mod sysinfo;

pub use agent::{Agent, ExecutionReport};
pub use allowlist::AllowList;
pub use exec::{CommandExecutor, CommandRequest, CommandResult};
pub use plan::{CommandPlan, ParsedPlan};
