pub mod agents;
pub mod conversation;
pub mod credential;
pub mod embed;
pub mod llm_client;
pub mod mcp_client;
pub mod protocol;
pub mod realtime;
pub mod supervisor;
pub mod tools;
pub mod widget;
