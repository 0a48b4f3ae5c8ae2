//! Flow definition: the declarative question graph and its YAML loader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::FlowError;

/// File name the loader searches for in each candidate directory.
pub const FLOW_FILE_NAME: &str = "conversation-flow.yaml";

/// Target of a routing rule: a real question id or the end-of-flow marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeRef {
    Question(i64),
    Marker(String),
}

impl NodeRef {
    /// The question id, if this reference targets a question.
    pub fn question_id(&self) -> Option<i64> {
        match self {
            Self::Question(id) => Some(*id),
            Self::Marker(_) => None,
        }
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Question(id) => write!(f, "{id}"),
            Self::Marker(marker) => write!(f, "{marker}"),
        }
    }
}

/// One answer-to-successor mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Case-insensitive substring the normalized answer must contain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_contains: Option<String>,
    /// Catch-all rule used when no substring rule fires.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
    pub next_question: NodeRef,
}

impl RoutingRule {
    /// The lowercased match condition, ignoring empty strings.
    fn needle(&self) -> Option<String> {
        self.answer_contains
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

/// One question step in the scripted conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionNode {
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub routes: Vec<RoutingRule>,
}

impl QuestionNode {
    /// Pick the successor for an already-normalized answer.
    ///
    /// The first matching substring rule wins. A default rule does not stop
    /// evaluation; the first default seen is kept as the fallback.
    pub fn route(&self, normalized_answer: &str) -> Option<&NodeRef> {
        let mut fallback = None;
        for rule in &self.routes {
            if rule
                .needle()
                .is_some_and(|needle| normalized_answer.contains(&needle))
            {
                return Some(&rule.next_question);
            }
            if rule.default && fallback.is_none() {
                fallback = Some(&rule.next_question);
            }
        }
        fallback
    }
}

/// Global flow settings (`config:` section of the document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSettings {
    pub start_question: i64,
    pub end_marker: String,
}

/// Raw document shape, before indexing.
#[derive(Debug, Deserialize)]
struct FlowDocument {
    questions: Vec<QuestionNode>,
    config: FlowSettings,
}

/// A load-time finding that does not prevent the flow from running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowWarning {
    MissingStartQuestion(i64),
    DanglingReference { from: i64, target: NodeRef },
}

impl std::fmt::Display for FlowWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingStartQuestion(id) => write!(f, "start question {id} is not defined"),
            Self::DanglingReference { from, target } => {
                write!(f, "question {from} routes to undefined target {target}")
            }
        }
    }
}

/// The loaded, immutable question graph.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    nodes: HashMap<i64, QuestionNode>,
    config: FlowSettings,
    source: Option<PathBuf>,
}

impl FlowDefinition {
    /// Parse a definition from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, FlowError> {
        let doc: FlowDocument = serde_yaml::from_str(yaml)?;
        let mut nodes = HashMap::with_capacity(doc.questions.len());
        for question in doc.questions {
            let id = question.id;
            if nodes.insert(id, question).is_some() {
                return Err(FlowError::DuplicateQuestion(id));
            }
        }
        Ok(Self {
            nodes,
            config: doc.config,
            source: None,
        })
    }

    /// Read and parse a definition from a file.
    pub fn from_file(path: &Path) -> Result<Self, FlowError> {
        let contents = std::fs::read_to_string(path).map_err(|source| FlowError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut definition = Self::from_yaml(&contents)?;
        definition.source = Some(path.to_path_buf());
        Ok(definition)
    }

    /// Load from the first candidate path that exists.
    pub fn load(candidates: &[PathBuf]) -> Result<Self, FlowError> {
        let path = candidates
            .iter()
            .find(|p| p.is_file())
            .ok_or_else(|| FlowError::DefinitionNotFound {
                tried: candidates.to_vec(),
            })?;

        info!(path = %path.display(), "Loading conversation flow");
        let definition = Self::from_file(path)?;
        info!(
            questions = definition.len(),
            start = definition.config.start_question,
            "Conversation flow loaded"
        );
        for finding in definition.validate() {
            warn!(%finding, "Conversation flow anomaly");
        }
        Ok(definition)
    }

    /// Standard search locations: the source tree, the working directory, and
    /// next to the executable.
    pub fn default_candidates() -> Vec<PathBuf> {
        let mut candidates = vec![
            Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("config")
                .join(FLOW_FILE_NAME),
            PathBuf::from("config").join(FLOW_FILE_NAME),
        ];
        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(dir.join("config").join(FLOW_FILE_NAME));
        }
        candidates
    }

    /// Report references that will not resolve at runtime.
    pub fn validate(&self) -> Vec<FlowWarning> {
        let mut findings = Vec::new();
        if !self.nodes.contains_key(&self.config.start_question) {
            findings.push(FlowWarning::MissingStartQuestion(self.config.start_question));
        }

        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            for rule in &self.nodes[&id].routes {
                if !self.resolves(&rule.next_question) {
                    findings.push(FlowWarning::DanglingReference {
                        from: id,
                        target: rule.next_question.clone(),
                    });
                }
            }
        }
        findings
    }

    fn resolves(&self, target: &NodeRef) -> bool {
        self.is_end_marker(target)
            || target
                .question_id()
                .is_some_and(|id| self.nodes.contains_key(&id))
    }

    pub fn question(&self, id: i64) -> Option<&QuestionNode> {
        self.nodes.get(&id)
    }

    pub fn config(&self) -> &FlowSettings {
        &self.config
    }

    pub fn is_end_marker(&self, target: &NodeRef) -> bool {
        matches!(target, NodeRef::Marker(marker) if *marker == self.config.end_marker)
    }

    /// Path the definition was read from, if it came from a file.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
