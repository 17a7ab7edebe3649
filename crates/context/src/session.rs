//! Chat turn driver: one buffer, one generation backend.

use crate::assembler::AssembleOptions;
use crate::buffer::{AppendResult, ContextBuffer};
use membound_core::{ContextError, GenerationBackend, Role, StatsSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub reply: String,
    /// Budgeted tokens in the prompt sent to the backend
    pub prompt_tokens: usize,
    pub user: Option<AppendResult>,
    pub assistant: Option<AppendResult>,
    pub stats: StatsSnapshot,
}

pub struct Session {
    buffer: ContextBuffer,
    generator: Arc<dyn GenerationBackend>,
    options: AssembleOptions,
}

impl Session {
    pub fn new(buffer: ContextBuffer, generator: Arc<dyn GenerationBackend>) -> Self {
        Self {
            buffer,
            generator,
            options: AssembleOptions::default(),
        }
    }

    pub fn with_assemble_options(mut self, options: AssembleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn buffer(&self) -> &ContextBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ContextBuffer {
        &mut self.buffer
    }

    pub fn into_buffer(self) -> ContextBuffer {
        self.buffer
    }

    /// Append `message`, generate a reply from the assembled context and
    /// append the reply.
    ///
    /// A blank message is a no-op. Generation errors propagate unchanged;
    /// the user message stays in the buffer.
    pub async fn turn(&mut self, message: &str, max_output_tokens: usize) -> Result<TurnOutcome, ContextError> {
        if message.trim().is_empty() {
            return Ok(TurnOutcome {
                reply: String::new(),
                prompt_tokens: 0,
                user: None,
                assistant: None,
                stats: self.buffer.stats().snapshot(),
            });
        }

        let user = self.buffer.append(message, Role::User).await?;
        let assembled = self.buffer.assemble(&self.options);
        let limit = max_output_tokens.min(self.buffer.max_tokens());

        debug!(
            backend = self.generator.name(),
            prompt_tokens = assembled.span_tokens,
            limit,
            "generating"
        );
        let reply = self.generator.generate(&assembled.prompt, limit).await?;
        let assistant = self.buffer.append(reply.clone(), Role::Assistant).await?;

        Ok(TurnOutcome {
            reply,
            prompt_tokens: assembled.span_tokens,
            user: Some(user),
            assistant: Some(assistant),
            stats: self.buffer.stats().snapshot(),
        })
    }
}
