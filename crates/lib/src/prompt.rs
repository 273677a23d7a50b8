//! Prompt template: safety preamble, host context, user request, and the JSON reply format.

use crate::allowlist::AllowList;
use crate::sysinfo::SystemInfo;

const RESPONSE_FORMAT: &str = r#"Please respond in valid JSON format with the following structure:
{
  "thoughts": "Your reasoning about what the user wants",
  "commands": [
    {
      "command": "command_name",
      "args": ["arg1", "arg2"],
      "timeout": 30
    }
  ],
  "explanation": "Explain what you're going to do and why",
  "confidence": 0.95
}"#;

/// System preamble. The "Available commands" line is generated from `allowlist` so the
/// model is only ever told about names the executor will accept.
pub fn system_prompt(allowlist: &AllowList) -> String {
    let available = allowlist.names().collect::<Vec<_>>().join(", ");
    format!(
        "You are a helpful AI assistant that can execute commands on the user's system. Your role is to:

1. Understand user requests and translate them into appropriate system commands
2. Only suggest safe, whitelisted commands
3. Provide clear explanations of what you're doing
4. Express confidence in your decisions

Available commands: {available}

Safety rules:
- Never suggest dangerous commands like 'sudo', 'rm -rf /', 'format', or 'dd'
- Always use safe alternatives
- Explain what each command does
- Be specific about arguments and options
- Pass each argument separately; commands are not run through a shell, so pipes, redirects and globs do not work

Respond in valid JSON format with thoughts, commands array, explanation, and confidence level."
    )
}

/// Full prompt sent to the backend for one request.
pub fn build_prompt(allowlist: &AllowList, info: &SystemInfo, user_text: &str) -> String {
    format!(
        "{}\n\nContext: {}\n\nUser request: {}\n\n{}",
        system_prompt(allowlist),
        info.context_line(),
        user_text.trim(),
        RESPONSE_FORMAT
    )
}
