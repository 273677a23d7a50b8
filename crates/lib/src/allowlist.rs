//! Command allowlist: the fixed set of binary names that may ever be spawned.
//!
//! Built once at startup and shared by reference (`Arc<AllowList>`). There is no
//! API to add or remove names afterwards, and nothing derived from model output
//! ever reaches the constructor.

use std::collections::BTreeSet;

/// Names permitted by the built-in allowlist.
const BUILTIN_COMMANDS: &[&str] = &[
    "ls",
    "pwd",
    "whoami",
    "date",
    "uptime",
    "ps",
    "top",
    "df",
    "du",
    "find",
    "grep",
    "cat",
    "head",
    "tail",
    "wc",
    "sort",
    "uniq",
    "echo",
    "mkdir",
    "rmdir",
    "cp",
    "mv",
    "rm",
    "chmod",
    "chown",
    "file",
    "stat",
    "which",
    "whereis",
    "system_profiler",
    "sw_vers",
    "defaults",
    "launchctl",
    "netstat",
    "lsof",
    "ifconfig",
    "ping",
    "nslookup",
    "dig",
    "curl",
    "wget",
];

/// Immutable set of permitted command names. Matching is exact and case-sensitive.
#[derive(Debug, Clone)]
pub struct AllowList {
    names: BTreeSet<String>,
}

impl AllowList {
    /// The default allowlist: read-mostly inspection, file and network utilities.
    pub fn builtin() -> Self {
        Self::from_names(BUILTIN_COMMANDS.iter().copied())
    }

    /// Build an allowlist from an explicit set of names (e.g. a host with a narrower policy).
    /// Blank names are ignored so an empty string can never match.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .map(Into::into)
            .filter(|n: &String| !n.trim().is_empty())
            .collect();
        Self { names }
    }

    /// True if `name` is exactly one of the permitted names.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Permitted names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::builtin()
    }
}
