//! In-memory client for flush and buffer tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{ChatClient, PostOptions};
use crate::error::DeliveryError;
use crate::payload::Payload;

/// Records every attempted post and answers from a script, then from
/// `fallback` once the script is exhausted.
pub(crate) struct ScriptedClient {
    attempts: Mutex<Vec<Payload>>,
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    fallback: Result<(), DeliveryError>,
}

impl ScriptedClient {
    pub(crate) fn succeeding() -> Self {
        Self::with_script(Vec::new(), Ok(()))
    }

    pub(crate) fn with_script(
        script: Vec<Result<(), DeliveryError>>,
        fallback: Result<(), DeliveryError>,
    ) -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            fallback,
        }
    }

    pub(crate) fn attempts(&self) -> Vec<Payload> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn post_message(
        &self,
        payload: &Payload,
        _options: &PostOptions,
    ) -> Result<(), DeliveryError> {
        self.attempts.lock().unwrap().push(payload.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}
