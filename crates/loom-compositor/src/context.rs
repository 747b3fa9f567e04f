//! Per-conversation lookups the compositor consults: citations, supervisor
//! identity and the sub-agent directory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Knowledge-retrieval hits attached to a conversation or a sub-agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeHits {
    pub search_list: Vec<Value>,
}

/// Directory entry for one sub-agent, keyed by its name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubAgentProfile {
    pub avatar: Option<String>,
    pub knowledge: Option<KnowledgeHits>,
}

/// Read-only context for one user turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationContext {
    /// Name of the supervisor. A hand-off naming it never starts a sub-agent.
    pub main_agent_name: String,
    pub main_agent_id: String,
    pub knowledge: Option<KnowledgeHits>,
    pub sub_agents: BTreeMap<String, SubAgentProfile>,
}

impl ConversationContext {
    pub fn with_main_agent(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            main_agent_name: name.into(),
            main_agent_id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_knowledge(mut self, search_list: Vec<Value>) -> Self {
        self.knowledge = Some(KnowledgeHits { search_list });
        self
    }

    pub fn with_sub_agent(mut self, name: impl Into<String>, profile: SubAgentProfile) -> Self {
        self.sub_agents.insert(name.into(), profile);
        self
    }

    pub fn has_knowledge(&self) -> bool {
        self.knowledge.is_some()
    }

    /// Conversation citations; empty when no retrieval ran.
    pub fn citations(&self) -> Vec<Value> {
        self.knowledge
            .as_ref()
            .map(|hits| hits.search_list.clone())
            .unwrap_or_default()
    }

    pub fn sub_agent_citations(&self, name: &str) -> Vec<Value> {
        self.sub_agents
            .get(name)
            .and_then(|profile| profile.knowledge.as_ref())
            .map(|hits| hits.search_list.clone())
            .unwrap_or_default()
    }

    pub fn avatar_for(&self, name: &str, default_avatar: &str) -> String {
        self.sub_agents
            .get(name)
            .and_then(|profile| profile.avatar.as_deref())
            .filter(|avatar| !avatar.trim().is_empty())
            .unwrap_or(default_avatar)
            .to_string()
    }
}
