//! Supported agents and how each one is driven while the proxy is up.
use std::fmt;

/// How an agent's traffic reaches the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// CLI that honours `HTTP(S)_PROXY`: run `<program> <prefix_args...> <instruction>`.
    Cli,
    /// Node CLI that ignores proxy variables: run through the preload shim.
    NodeShimmed,
    /// IDE application: the user drives it by hand while the proxy captures.
    Ide,
    /// Used through an HTTP API from the user's own client code.
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentProfile {
    pub id: &'static str,
    pub display: &'static str,
    pub kind: AgentKind,
    /// Executable looked up on PATH, when the agent has one.
    pub program: Option<&'static str>,
    /// Arguments placed before the instruction.
    pub prefix_args: &'static [&'static str],
}

impl fmt::Display for AgentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}

pub const AGENTS: &[AgentProfile] = &[
    AgentProfile {
        id: "claude",
        display: "Claude Code",
        kind: AgentKind::Cli,
        program: Some("claude"),
        prefix_args: &[],
    },
    AgentProfile {
        id: "auggie",
        display: "Augment CLI",
        kind: AgentKind::NodeShimmed,
        program: Some("auggie"),
        prefix_args: &["--print"],
    },
    AgentProfile {
        id: "cursor",
        display: "Cursor",
        kind: AgentKind::Ide,
        program: None,
        prefix_args: &[],
    },
    AgentProfile {
        id: "copilot",
        display: "GitHub Copilot",
        kind: AgentKind::Api,
        program: None,
        prefix_args: &[],
    },
    AgentProfile {
        id: "codeium",
        display: "Codeium",
        kind: AgentKind::Api,
        program: None,
        prefix_args: &[],
    },
    AgentProfile {
        id: "chatgpt",
        display: "ChatGPT",
        kind: AgentKind::Api,
        program: None,
        prefix_args: &[],
    },
];

/// Identifiers accepted on the command line, in display order.
pub fn supported_agent_ids() -> Vec<&'static str> {
    AGENTS.iter().map(|a| a.id).collect()
}

/// Case-insensitive allow-list lookup.
pub fn lookup_agent(id: &str) -> Option<&'static AgentProfile> {
    let needle = id.trim().to_ascii_lowercase();
    AGENTS.iter().find(|a| a.id == needle)
}
