//! Agent request: probe the host, prompt the backend, parse the plan, run each command.
//!
//! One request is one pass through
//! `prompting -> awaiting backend -> (backend failed | parsing -> executing -> done)`.
//! Only a backend failure stops a request early; parse degradation and command
//! failures are reported as data in the [`ExecutionReport`].

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::allowlist::AllowList;
use crate::exec::{CommandExecutor, CommandResult};
use crate::llm::{BackendError, LlmBackend};
use crate::plan::{self, CommandPlan, ParsedPlan};
use crate::prompt;
use crate::sysinfo::SystemInfoProbe;

/// Everything produced for one request. `results` is index-aligned with `plan.commands`
/// whenever execution was attempted; it is empty when the backend failed.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub request_id: Uuid,
    pub plan: CommandPlan,
    pub results: Vec<CommandResult>,
    /// Advisory: the model answered but not with a valid plan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_error: Option<String>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.backend_error.is_none() && self.results.iter().all(|r| r.succeeded)
    }
}

/// Orchestrates one backend and one executor. Holds no per-request state, so
/// `handle` can be called concurrently from several tasks.
pub struct Agent<B: LlmBackend> {
    backend: B,
    allowlist: Arc<AllowList>,
    executor: CommandExecutor,
    probe: SystemInfoProbe,
}

impl<B: LlmBackend> Agent<B> {
    pub fn new(backend: B, allowlist: Arc<AllowList>) -> Self {
        let executor = CommandExecutor::new(Arc::clone(&allowlist));
        Self {
            backend,
            allowlist,
            executor,
            probe: SystemInfoProbe::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Prompt that would be sent for `user_text` on this host.
    pub fn prompt_for(&self, user_text: &str) -> String {
        let info = self.probe.probe();
        prompt::build_prompt(&self.allowlist, &info, user_text)
    }

    /// Ask the backend for a plan without executing anything.
    pub async fn plan(&self, user_text: &str) -> Result<ParsedPlan, BackendError> {
        let prompt = self.prompt_for(user_text);
        log::debug!("agent: sending {} byte prompt to {}", prompt.len(), self.backend.name());
        let raw = self.backend.send(&prompt).await?;
        Ok(plan::parse(&raw))
    }

    /// Run every command in order. A failing command never stops the ones after it.
    pub async fn run_plan(&self, plan: &CommandPlan) -> Vec<CommandResult> {
        let mut results = Vec::with_capacity(plan.commands.len());
        for (i, req) in plan.commands.iter().enumerate() {
            log::debug!("agent: command {}/{}: {}", i + 1, plan.commands.len(), req.display());
            results.push(self.executor.execute(req).await);
        }
        results
    }

    pub async fn handle(&self, user_text: &str) -> ExecutionReport {
        let request_id = Uuid::new_v4();
        log::info!("agent[{}]: request via {}", request_id, self.backend.name());

        let parsed = match self.plan(user_text).await {
            Ok(p) => p,
            Err(e) => {
                log::warn!("agent[{}]: backend failed: {}", request_id, e);
                return ExecutionReport {
                    request_id,
                    plan: CommandPlan::empty(),
                    results: Vec::new(),
                    parse_error: None,
                    backend_error: Some(e.to_string()),
                };
            }
        };

        let parse_error = parsed
            .degradation_reason()
            .map(|r| format!("Invalid JSON response from AI: {}", r));
        let plan = parsed.into_plan();
        let results = self.run_plan(&plan).await;
        log::info!(
            "agent[{}]: done, {}/{} command(s) succeeded",
            request_id,
            results.iter().filter(|r| r.succeeded).count(),
            results.len()
        );
        ExecutionReport {
            request_id,
            plan,
            results,
            parse_error,
            backend_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Canned(String);

    fn canned(text: &str) -> Canned {
        Canned(text.to_string())
    }

    #[async_trait]
    impl LlmBackend for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn send(&self, _prompt: &str) -> Result<String, BackendError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn plan_does_not_execute() {
        let dir = std::env::temp_dir().join(format!("sysagent-plan-{}", Uuid::new_v4()));
        let reply = serde_json::json!({
            "commands": [{ "command": "mkdir", "args": [dir.to_string_lossy()] }]
        });
        let agent = Agent::new(Canned(reply.to_string()), Arc::new(AllowList::builtin()));
        let parsed = agent.plan("make a dir").await.unwrap();
        assert_eq!(parsed.plan().commands.len(), 1);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn degraded_plan_sets_parse_error() {
        let agent = Agent::new(canned("just chatting"), Arc::new(AllowList::builtin()));
        let report = agent.handle("hi").await;
        assert!(report.backend_error.is_none());
        assert!(report
            .parse_error
            .as_deref()
            .unwrap_or_default()
            .starts_with("Invalid JSON response from AI"));
        assert!(report.results.is_empty());
    }

    #[test]
    fn prompt_lists_only_allowed_commands() {
        let agent = Agent::new(canned("{}"), Arc::new(AllowList::from_names(["date"])));
        let p = agent.prompt_for("what time is it");
        assert!(p.contains("Available commands: date\n"));
    }
}
