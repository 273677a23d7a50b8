//! Normalize raw model text into a typed [`CommandPlan`].
//!
//! Parsing never fails. Text that does not hold a valid plan object yields
//! [`ParsedPlan::Degraded`]: no commands, zero confidence, and the raw text kept
//! verbatim as the explanation. The parser does not consult the allowlist; the
//! executor checks every name itself.

use serde::{Deserialize, Serialize};

use crate::exec::CommandRequest;

pub const DEGRADED_REASONING: &str = "Failed to parse AI response as structured output";

/// What the backend suggested running. `reasoning` and `confidence` are advisory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandPlan {
    pub reasoning: String,
    pub commands: Vec<CommandRequest>,
    pub explanation: String,
    pub confidence: f64,
}

impl CommandPlan {
    /// A plan with nothing to run (used when the backend failed).
    pub fn empty() -> Self {
        Self {
            reasoning: String::new(),
            commands: Vec::new(),
            explanation: String::new(),
            confidence: 0.0,
        }
    }

    fn degraded(raw: &str) -> Self {
        Self {
            reasoning: DEGRADED_REASONING.to_string(),
            commands: Vec::new(),
            explanation: raw.to_string(),
            confidence: 0.0,
        }
    }
}

/// Result of [`parse`]: either a structured plan or the degraded fallback with the reason.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPlan {
    Structured(CommandPlan),
    Degraded { plan: CommandPlan, reason: String },
}

impl ParsedPlan {
    pub fn plan(&self) -> &CommandPlan {
        match self {
            ParsedPlan::Structured(plan) | ParsedPlan::Degraded { plan, .. } => plan,
        }
    }

    pub fn into_plan(self) -> CommandPlan {
        match self {
            ParsedPlan::Structured(plan) | ParsedPlan::Degraded { plan, .. } => plan,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ParsedPlan::Degraded { .. })
    }

    pub fn degradation_reason(&self) -> Option<&str> {
        match self {
            ParsedPlan::Degraded { reason, .. } => Some(reason),
            ParsedPlan::Structured(_) => None,
        }
    }
}

/// Wire shape requested from the model.
#[derive(Debug, Deserialize)]
struct PlanPayload {
    #[serde(default)]
    thoughts: Option<String>,
    commands: Vec<CommandPayload>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CommandPayload {
    command: String,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    timeout: Option<i64>,
}

impl PlanPayload {
    fn into_plan(self) -> Result<CommandPlan, String> {
        let mut commands = Vec::with_capacity(self.commands.len());
        for (i, c) in self.commands.into_iter().enumerate() {
            if c.command.trim().is_empty() {
                return Err(format!("commands[{}]: empty command name", i));
            }
            commands.push(CommandRequest {
                name: c.command,
                args: c.args.unwrap_or_default(),
                timeout_secs: c.timeout,
            });
        }
        let confidence = match self.confidence {
            Some(c) if !c.is_finite() => return Err("confidence is not a finite number".into()),
            Some(c) => c.clamp(0.0, 1.0),
            None => 0.0,
        };
        Ok(CommandPlan {
            reasoning: self.thoughts.unwrap_or_default(),
            commands,
            explanation: self.explanation.unwrap_or_default(),
            confidence,
        })
    }
}

/// Interpret `raw` as a plan. Tries the whole text, then a fenced code block, then the
/// outermost `{...}` span; the first candidate that decodes and validates wins.
pub fn parse(raw: &str) -> ParsedPlan {
    let mut reason = String::from("no JSON object found");
    for candidate in candidates(raw) {
        let decoded = serde_json::from_str::<PlanPayload>(candidate)
            .map_err(|e| e.to_string())
            .and_then(PlanPayload::into_plan);
        match decoded {
            Ok(plan) => return ParsedPlan::Structured(plan),
            Err(e) => reason = e,
        }
    }
    log::warn!("plan: model output is not a valid plan: {}", reason);
    ParsedPlan::Degraded {
        plan: CommandPlan::degraded(raw),
        reason,
    }
}

fn candidates(raw: &str) -> Vec<&str> {
    let trimmed = raw.trim();
    let mut out = Vec::with_capacity(3);
    if trimmed.is_empty() {
        return out;
    }
    out.push(trimmed);
    if let Some(block) = fenced_block(trimmed) {
        out.push(block);
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            let span = &trimmed[start..=end];
            if !out.contains(&span) {
                out.push(span);
            }
        }
    }
    out
}

/// Body of the first Markdown code fence, with any language tag dropped.
fn fenced_block(s: &str) -> Option<&str> {
    let open = s.find("```")?;
    let after = &s[open + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}
