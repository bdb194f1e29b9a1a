//! Agent Registry
//!
//! Agent sets are selected by the `agentConfig` key of the widget URL. Each set
//! lists its agents (the first one starts active unless `agentName` picks
//! another), their instructions, their tools, and which agents they may hand
//! the conversation to. The registry is built once at startup and shared
//! read-only afterwards.

use crate::tools::{
    self, ACCOUNT_INFO_TOOL, LOOKUP_POLICY_TOOL, NEAREST_STORE_TOOL, SUPERVISOR_TOOL,
    ToolDescriptor,
};
use anyhow::Context;
use std::{collections::HashMap, fs, path::Path, sync::Arc};
use tracing::{info, warn};

pub const SUPERVISOR_PROMPT_KEY: &str = "supervisor";

/// Tools the supervisor model may call while deciding on a reply.
pub const SUPERVISOR_TOOLS: [&str; 3] = [LOOKUP_POLICY_TOOL, ACCOUNT_INFO_TOOL, NEAREST_STORE_TOOL];

const SUPERVISOR_INSTRUCTIONS: &str = "You are an expert customer service supervisor agent. \
You are given the conversation so far and context about the latest user message. \
Use your tools to look up facts before answering; never guess policy or account details. \
Reply with the exact message the junior agent should say next, short and suitable for speech.";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    pub public_description: String,
    pub instructions: String,
    pub tools: Vec<String>,
    pub handoffs: Vec<String>,
    pub voice: Option<String>,
}

impl AgentConfig {
    fn new(name: &str, public_description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            public_description: public_description.to_string(),
            instructions: instructions.to_string(),
            tools: Vec::new(),
            handoffs: Vec::new(),
            voice: None,
        }
    }

    fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    fn with_handoffs(mut self, handoffs: &[&str]) -> Self {
        self.handoffs = handoffs.iter().map(|h| h.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentSet {
    pub key: String,
    pub agents: Vec<AgentConfig>,
}

impl AgentSet {
    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// The named agent if it exists, otherwise the set's default (first) agent.
    pub fn starting_agent(&self, name: Option<&str>) -> Option<&AgentConfig> {
        name.and_then(|n| self.agent(n)).or_else(|| self.agents.first())
    }

    /// Tool descriptors for an agent: its own tools plus one per handoff target.
    pub fn tool_descriptors(&self, agent: &AgentConfig) -> Vec<ToolDescriptor> {
        let own = agent.tools.iter().filter_map(|name| {
            let descriptor = tools::descriptor_for(name);
            if descriptor.is_none() {
                warn!(agent = %agent.name, tool = %name, "Agent lists a tool with no descriptor");
            }
            descriptor
        });
        let handoffs = agent.handoffs.iter().filter_map(|target| {
            self.agent(target)
                .map(|t| tools::handoff_descriptor(&t.name, &t.public_description))
        });
        own.chain(handoffs).collect()
    }

    /// Whether `from` is allowed to hand the conversation to `to`.
    pub fn can_hand_off(&self, from: &str, to: &str) -> bool {
        self.agent(from)
            .is_some_and(|a| a.handoffs.iter().any(|h| h == to))
            && self.agent(to).is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AgentRegistry {
    sets: HashMap<String, Arc<AgentSet>>,
    supervisor_instructions: String,
}

impl AgentRegistry {
    /// The built-in agent sets.
    pub fn builtin() -> Self {
        let sets = [chat_supervisor(), feedback_survey(), simple_handoff()]
            .into_iter()
            .map(|set| (set.key.clone(), Arc::new(set)))
            .collect();
        Self {
            sets,
            supervisor_instructions: SUPERVISOR_INSTRUCTIONS.to_string(),
        }
    }

    /// Replaces instructions with prompt files keyed by agent name
    /// (`supervisor` for the supervisor model).
    pub fn with_prompt_overrides(mut self, prompts: &HashMap<String, String>) -> Self {
        if let Some(text) = prompts.get(SUPERVISOR_PROMPT_KEY) {
            self.supervisor_instructions = text.clone();
        }
        for set in self.sets.values_mut() {
            let mut updated = (**set).clone();
            for agent in updated.agents.iter_mut() {
                if let Some(text) = prompts.get(&agent.name) {
                    info!(set = %updated.key, agent = %agent.name, "Using prompt override");
                    agent.instructions = text.clone();
                }
            }
            *set = Arc::new(updated);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<Arc<AgentSet>> {
        self.sets.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.sets.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn supervisor_instructions(&self) -> &str {
        &self.supervisor_instructions
    }
}

/// Reads every `*.md` file in a directory, keyed by file stem.
pub fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

fn chat_supervisor() -> AgentSet {
    let chat = AgentConfig::new(
        "chatAgent",
        "Customer service chat agent for a mobile carrier.",
        "You are a helpful junior customer service agent. Greet the user warmly and keep a \
         natural conversational tone. You may handle greetings and chit-chat yourself. For \
         anything else, first say a short filler phrase such as \"Let me check\", then call \
         getNextResponseFromSupervisor and read its answer back verbatim.",
    )
    .with_tools(&[SUPERVISOR_TOOL]);

    AgentSet {
        key: "chatSupervisor".to_string(),
        agents: vec![chat],
    }
}

fn feedback_survey() -> AgentSet {
    let survey = AgentConfig::new(
        "surveyAgent",
        "Collects event feedback through a short spoken survey.",
        "You run a short feedback survey. Call fetch_questions first, then ask the questions \
         one at a time in a friendly voice. After each answer call save_response with the \
         question id and the user's answer as spoken. Thank the user when all questions are \
         answered.",
    )
    .with_tools(&["fetch_questions", "save_response", "get_all_responses"]);

    AgentSet {
        key: "feedbackSurvey".to_string(),
        agents: vec![survey],
    }
}

fn simple_handoff() -> AgentSet {
    let greeter = AgentConfig::new(
        "greeter",
        "Greets the user and routes them.",
        "Greet the user and ask whether they would like a haiku. If they do, transfer them \
         to the haiku writer.",
    )
    .with_handoffs(&["haikuWriter"]);
    let haiku = AgentConfig::new(
        "haikuWriter",
        "Writes haikus on any topic.",
        "Ask the user for a topic, then reply with a haiku about it.",
    );

    AgentSet {
        key: "simpleHandoff".to_string(),
        agents: vec![greeter, haiku],
    }
}
