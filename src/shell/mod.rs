// Interactive shell: a small state machine over the pipeline, and the terminal loop driving it

#[cfg(test)]
mod tests;

pub mod terminal;

pub use terminal::run_shell;

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::generation::{Answer, Backend};
use crate::pipeline::{Pipeline, RebuildStats};
use crate::{RagError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellState {
    Idle,
    Ingesting,
    IndexReady,
    Querying,
    Error(String),
}

impl fmt::Display for ShellState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("no index loaded"),
            Self::Ingesting => f.write_str("building index"),
            Self::IndexReady => f.write_str("index ready"),
            Self::Querying => f.write_str("answering"),
            Self::Error(message) => write!(f, "error: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    RebuildRequested,
    IngestSucceeded,
    QuestionSubmitted,
    AnswerProduced,
    Failed(String),
    Retry,
    /// The pipeline already holds a usable index
    IndexLoaded,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Cannot handle {event:?} while {state}")]
pub struct InvalidTransition {
    pub state: ShellState,
    pub event: ShellEvent,
}

/// Next state for `event`, or an error leaving `state` as it was.
///
/// A question asked while `Idle` moves to `Querying`; the pipeline then loads
/// the persisted index or fails with "build the index first".
#[inline]
pub fn transition(state: &ShellState, event: &ShellEvent) -> Result<ShellState, InvalidTransition> {
    let next = match (state, event) {
        (ShellState::Idle | ShellState::IndexReady, ShellEvent::RebuildRequested) => {
            ShellState::Ingesting
        }
        (ShellState::Ingesting, ShellEvent::IngestSucceeded)
        | (ShellState::Querying, ShellEvent::AnswerProduced) => ShellState::IndexReady,
        (ShellState::Idle | ShellState::IndexReady, ShellEvent::QuestionSubmitted) => {
            ShellState::Querying
        }
        (ShellState::Ingesting | ShellState::Querying, ShellEvent::Failed(message)) => {
            ShellState::Error(message.clone())
        }
        (ShellState::Error(_), ShellEvent::Retry) => ShellState::Idle,
        (ShellState::Idle, ShellEvent::IndexLoaded) => ShellState::IndexReady,
        _ => {
            return Err(InvalidTransition {
                state: state.clone(),
                event: event.clone(),
            });
        }
    };
    Ok(next)
}

/// Shell session: the pipeline plus the state the user sees
pub struct Session {
    pipeline: Pipeline,
    state: ShellState,
}

impl Session {
    /// Start in `IndexReady` when a persisted index loads, otherwise `Idle`
    #[inline]
    pub async fn start(pipeline: Pipeline) -> Self {
        let loaded = match pipeline.load_persisted().await {
            Ok(index) => {
                info!("Loaded existing index with {} chunks", index.len());
                true
            }
            Err(RagError::IndexNotFound(path)) => {
                info!("No index at {} yet", path.display());
                false
            }
            Err(e) => {
                warn!("Ignoring unusable index: {}", e);
                false
            }
        };
        let state = if loaded {
            ShellState::IndexReady
        } else {
            ShellState::Idle
        };
        Self { pipeline, state }
    }

    #[inline]
    pub fn state(&self) -> &ShellState {
        &self.state
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[inline]
    pub async fn rebuild(&mut self) -> Result<RebuildStats> {
        self.apply(&ShellEvent::RebuildRequested)?;

        match self.pipeline.rebuild_index().await {
            Ok(stats) => {
                self.apply(&ShellEvent::IngestSucceeded)?;
                Ok(stats)
            }
            Err(e) => {
                self.apply(&ShellEvent::Failed(e.to_string()))?;
                Err(e)
            }
        }
    }

    #[inline]
    pub async fn ask(&mut self, question: &str, backend: Backend) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(RagError::Config("Question must not be empty".to_string()));
        }

        self.apply(&ShellEvent::QuestionSubmitted)?;

        match self.pipeline.answer(question, backend, None).await {
            Ok(answer) => {
                self.apply(&ShellEvent::AnswerProduced)?;
                Ok(answer)
            }
            Err(e) => {
                self.apply(&ShellEvent::Failed(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Leave `Error`, landing in `IndexReady` when an index is still in memory
    #[inline]
    pub async fn retry(&mut self) -> Result<()> {
        self.apply(&ShellEvent::Retry)?;
        if self.pipeline.current_index().await.is_some() {
            self.apply(&ShellEvent::IndexLoaded)?;
        }
        Ok(())
    }

    fn apply(&mut self, event: &ShellEvent) -> Result<()> {
        let next = transition(&self.state, event).map_err(anyhow::Error::from)?;
        debug!("Shell state {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }
}
