//! In-memory fakes shared by the unit tests.

use crate::agent::EventStream;
use crate::content::{Content, Part};
use crate::error::{AgentError, Result};
use crate::events::Event;
use crate::llm::{BaseLlm, LlmRequest, LlmResponse, LlmResponseStream};
use crate::services::{ArtifactKey, ArtifactService, MemoryService, SearchMemoryResponse};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

#[derive(Default)]
pub struct InMemoryArtifactService {
    files: Mutex<HashMap<ArtifactKey, Vec<Part>>>,
}

#[async_trait]
impl ArtifactService for InMemoryArtifactService {
    async fn load_artifact(&self, key: &ArtifactKey, version: Option<u32>) -> Result<Option<Part>> {
        let files = self.files.lock();
        let Some(versions) = files.get(key) else {
            return Ok(None);
        };
        Ok(match version {
            Some(v) => versions.get(v as usize).cloned(),
            None => versions.last().cloned(),
        })
    }

    async fn save_artifact(&self, key: &ArtifactKey, artifact: Part) -> Result<u32> {
        let mut files = self.files.lock();
        let versions = files.entry(key.clone()).or_default();
        versions.push(artifact);
        Ok((versions.len() - 1) as u32)
    }

    async fn list_artifact_keys(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .files
            .lock()
            .keys()
            .filter(|k| k.app_name == app_name && k.user_id == user_id && k.session_id == session_id)
            .map(|k| k.filename.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

pub struct StaticMemoryService {
    memories: Vec<Value>,
}

impl StaticMemoryService {
    pub fn new(memories: Vec<Value>) -> Self {
        Self { memories }
    }
}

#[async_trait]
impl MemoryService for StaticMemoryService {
    async fn search_memory(
        &self,
        _app_name: &str,
        _user_id: &str,
        _query: &str,
    ) -> Result<SearchMemoryResponse> {
        Ok(SearchMemoryResponse {
            memories: self.memories.clone(),
        })
    }
}

/// One scripted model turn.
pub enum Turn {
    Respond(Vec<LlmResponse>),
    Fail(String),
}

/// A model that replays scripted turns and records every request.
pub struct ScriptedLlm {
    model: String,
    turns: Mutex<VecDeque<Turn>>,
    pub requests: Mutex<Vec<(LlmRequest, bool)>>,
}

impl ScriptedLlm {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            model: "scripted-model".to_string(),
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|t| Turn::Respond(vec![LlmResponse::from_content(Content::model_text(*t))]))
                .collect(),
        )
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl BaseLlm for ScriptedLlm {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate_content(&self, request: LlmRequest, stream: bool) -> LlmResponseStream {
        self.requests.lock().push((request, stream));
        match self.turns.lock().pop_front() {
            Some(Turn::Respond(responses)) => futures::stream::iter(responses.into_iter().map(Ok)).boxed(),
            Some(Turn::Fail(message)) => futures::stream::iter([Err(AgentError::Model {
                code: "UNAVAILABLE".to_string(),
                message,
            })])
            .boxed(),
            None => futures::stream::iter([Ok(LlmResponse::from_content(Content::model_text(
                "no scripted turn left",
            )))])
            .boxed(),
        }
    }
}

/// Drains a run, keeping errors in place.
pub async fn collect_all(stream: EventStream) -> Vec<Result<Event>> {
    stream.collect().await
}

/// Drains a run that is expected to succeed.
pub async fn collect_events(stream: EventStream) -> Vec<Event> {
    collect_all(stream)
        .await
        .into_iter()
        .map(|item| item.expect("run failed"))
        .collect()
}

pub fn texts(events: &[Event]) -> Vec<String> {
    events.iter().map(Event::stringify_content).collect()
}
