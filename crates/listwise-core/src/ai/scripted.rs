//! Deterministic model backend
//!
//! Routes each request by its `agent` label to either a queue of canned turns
//! or a responder closure. Used by tests and by the CLI's offline mode.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::{GenerateRequest, ModelBackend, ModelTurn};
use crate::error::ModelError;

pub type Responder =
    Arc<dyn Fn(&GenerateRequest) -> Result<ModelTurn, ModelError> + Send + Sync>;

enum Route {
    Queue(VecDeque<Result<ModelTurn, ModelError>>),
    Responder(Responder),
}

#[derive(Default)]
pub struct ScriptedBackend {
    routes: Mutex<HashMap<String, Route>>,
    fallback: Option<Responder>,
    calls: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue turns for an agent, returned in order. An exhausted queue is a
    /// model error.
    pub fn script(self, agent: &str, turns: Vec<ModelTurn>) -> Self {
        self.script_results(agent, turns.into_iter().map(Ok).collect())
    }

    pub fn script_results(self, agent: &str, turns: Vec<Result<ModelTurn, ModelError>>) -> Self {
        self.routes
            .lock()
            .insert(agent.to_string(), Route::Queue(turns.into()));
        self
    }

    pub fn respond<F>(self, agent: &str, responder: F) -> Self
    where
        F: Fn(&GenerateRequest) -> Result<ModelTurn, ModelError> + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .insert(agent.to_string(), Route::Responder(Arc::new(responder)));
        self
    }

    /// Responder for agents with no route of their own.
    pub fn fallback<F>(mut self, responder: F) -> Self
    where
        F: Fn(&GenerateRequest) -> Result<ModelTurn, ModelError> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(responder));
        self
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, agent: &str) -> Vec<GenerateRequest> {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.agent == agent)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<ModelTurn, ModelError> {
        self.calls.lock().push(request.clone());

        // Clone the responder out so it never runs under the routes lock
        let responder = {
            let mut routes = self.routes.lock();
            match routes.get_mut(&request.agent) {
                Some(Route::Queue(queue)) => {
                    return queue.pop_front().unwrap_or_else(|| {
                        Err(ModelError::new(format!(
                            "script exhausted for agent '{}'",
                            request.agent
                        )))
                    });
                }
                Some(Route::Responder(responder)) => Some(responder.clone()),
                None => None,
            }
        };

        match responder.or_else(|| self.fallback.clone()) {
            Some(responder) => responder(&request),
            None => Err(ModelError::new(format!(
                "no script for agent '{}'",
                request.agent
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::backend::ModelTier;

    #[tokio::test]
    async fn test_routes_by_agent() {
        let backend = ScriptedBackend::new()
            .script("manager", vec![ModelTurn::text("first"), ModelTurn::text("second")])
            .respond("vision", |req| Ok(ModelTurn::text(format!("saw {}", req.tier == ModelTier::Fast))));

        let manager = GenerateRequest::new("manager", ModelTier::Quality, "");
        let vision = GenerateRequest::new("vision", ModelTier::Fast, "");

        assert_eq!(backend.generate(manager.clone()).await.unwrap().text, "first");
        assert_eq!(backend.generate(vision).await.unwrap().text, "saw true");
        assert_eq!(backend.generate(manager.clone()).await.unwrap().text, "second");
        assert!(backend.generate(manager).await.is_err());
        assert_eq!(backend.calls_for("manager").len(), 3);
    }

    #[tokio::test]
    async fn test_unrouted_agent_uses_fallback() {
        let bare = ScriptedBackend::new();
        let req = GenerateRequest::new("editing", ModelTier::Fast, "");
        assert!(bare.generate(req.clone()).await.is_err());

        let with_fallback = ScriptedBackend::new().fallback(|_| Ok(ModelTurn::text("ok")));
        assert_eq!(with_fallback.generate(req).await.unwrap().text, "ok");
    }
}
