//! Flow engine: deterministic question routing over a loaded definition.
//!
//! Never calls a generative model: every prompt comes verbatim from the flow
//! definition or from the fixed closing statements below.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use super::definition::{FlowDefinition, NodeRef};
use crate::error::FlowError;

/// Placeholder substituted with the user's display name in the start prompt.
pub const USER_NAME_PLACEHOLDER: &str = "{userName}";

/// Closing statement returned when a route reaches the end marker.
pub const END_OF_FLOW_MESSAGE: &str = "Thank you for providing all this information. Based on what you've shared, I'll prepare a summary of your situation. A legal professional will review your case and get back to you soon.";

/// Closing statement returned when a route targets an undefined question.
pub const DANGLING_ROUTE_MESSAGE: &str =
    "Thank you for providing this information. We'll review your case and get back to you soon.";

/// First prompt of a scripted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartPrompt {
    pub question_id: i64,
    pub text: String,
}

/// Result of routing one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextPrompt {
    pub target: NodeRef,
    pub text: String,
    pub is_terminal: bool,
}

impl NextPrompt {
    /// The question the session moves to, `None` when terminal.
    pub fn question_id(&self) -> Option<i64> {
        if self.is_terminal {
            None
        } else {
            self.target.question_id()
        }
    }
}

/// Pure router over an immutable [`FlowDefinition`].
///
/// Safe to share across requests; the only interior state is the anomaly
/// counter.
#[derive(Debug, Default)]
pub struct FlowEngine {
    definition: Option<Arc<FlowDefinition>>,
    dangling_routes: AtomicU64,
}

impl FlowEngine {
    pub fn new(definition: Arc<FlowDefinition>) -> Self {
        Self {
            definition: Some(definition),
            dangling_routes: AtomicU64::new(0),
        }
    }

    /// An engine with no definition installed. Every query fails with
    /// [`FlowError::NotInitialized`].
    pub fn uninitialized() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.definition.is_some()
    }

    fn definition(&self) -> Result<&FlowDefinition, FlowError> {
        self.definition.as_deref().ok_or(FlowError::NotInitialized)
    }

    /// Number of routes that pointed at an undefined question since startup.
    pub fn dangling_routes(&self) -> u64 {
        self.dangling_routes.load(Ordering::Relaxed)
    }

    /// The start question, with the display name substituted.
    pub fn resolve_start(&self, display_name: &str) -> Result<StartPrompt, FlowError> {
        let definition = self.definition()?;
        let start_id = definition.config().start_question;
        let question = definition
            .question(start_id)
            .ok_or(FlowError::StartNodeNotFound(start_id))?;

        Ok(StartPrompt {
            question_id: question.id,
            text: question.text.replacen(USER_NAME_PLACEHOLDER, display_name, 1),
        })
    }

    /// Route `raw_answer` from `current_id` to the next prompt.
    pub fn resolve_next(&self, current_id: i64, raw_answer: &str) -> Result<NextPrompt, FlowError> {
        let definition = self.definition()?;
        let current = definition
            .question(current_id)
            .ok_or(FlowError::QuestionNotFound(current_id))?;

        let normalized = raw_answer.trim().to_lowercase();
        let target = current
            .route(&normalized)
            .cloned()
            .unwrap_or_else(|| NodeRef::Marker(definition.config().end_marker.clone()));

        if definition.is_end_marker(&target) {
            return Ok(NextPrompt {
                target,
                text: END_OF_FLOW_MESSAGE.to_string(),
                is_terminal: true,
            });
        }

        match target.question_id().and_then(|id| definition.question(id)) {
            Some(next) => Ok(NextPrompt {
                target,
                text: next.text.clone(),
                is_terminal: false,
            }),
            None => {
                self.dangling_routes.fetch_add(1, Ordering::Relaxed);
                warn!(
                    from = current_id,
                    target = %target,
                    total = self.dangling_routes(),
                    "Route targets undefined question, ending conversation"
                );
                Ok(NextPrompt {
                    target: NodeRef::Marker(definition.config().end_marker.clone()),
                    text: DANGLING_ROUTE_MESSAGE.to_string(),
                    is_terminal: true,
                })
            }
        }
    }

    /// Whether `target` is the configured end marker.
    pub fn is_end_of_flow(&self, target: &NodeRef) -> bool {
        self.definition
            .as_deref()
            .is_some_and(|d| d.is_end_marker(target))
    }
}
