//! Scripted conversation flow.
//!
//! A YAML document describes every question and how answers route between
//! them. [`FlowDefinition`] loads it once at startup; [`FlowEngine`] walks it
//! without any I/O, so identical answers always produce identical prompts.

pub mod definition;
pub mod engine;

pub use definition::{FlowDefinition, FlowSettings, FlowWarning, NodeRef, QuestionNode, RoutingRule};
pub use engine::{
    DANGLING_ROUTE_MESSAGE, END_OF_FLOW_MESSAGE, FlowEngine, NextPrompt, StartPrompt,
    USER_NAME_PLACEHOLDER,
};
