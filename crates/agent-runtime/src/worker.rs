//! # Task Worker
//!
//! Runs delivered tasks and queues their replies. A task is a flow message
//! with a `Data` body; the action name selects the handler. Every task gets
//! a terminal status, so the frontend stops redelivering it.

use fc_02_agent_comms::AgentHandle;
use shared_types::{FlowStatus, Message, MessageBody, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Agent-side action.
pub trait Action: Send + Sync {
    fn run(&self, args: &[u8]) -> Result<Vec<u8>, String>;
}

/// Returns its arguments.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoAction;

impl Action for EchoAction {
    fn run(&self, args: &[u8]) -> Result<Vec<u8>, String> {
        Ok(args.to_vec())
    }
}

/// Actions by name.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in actions.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("Echo", Arc::new(EchoAction));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
        self.actions.insert(name.into(), action);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Action>> {
        self.actions.get(name)
    }
}

/// Executes tasks from the transport loop's inbox.
pub struct TaskWorker {
    registry: ActionRegistry,
}

impl TaskWorker {
    pub fn new(registry: ActionRegistry) -> Self {
        Self { registry }
    }

    /// Replies for one server message. Messages that are not tasks get none.
    pub fn replies_for(&self, message: &Message) -> Vec<Message> {
        let (SessionId::Flow(_), MessageBody::Data(args)) = (&message.session, &message.body)
        else {
            debug!(
                "Ignoring {} message on {}",
                message.kind().as_str(),
                message.session
            );
            return Vec::new();
        };

        let reply = |response_id: u64, body: MessageBody| {
            Message::new(message.session.clone(), message.name.clone(), body)
                .with_ids(message.request_id, response_id)
                .with_task_id(message.task_id)
        };

        let outcome = match self.registry.get(&message.name) {
            Some(action) => action.run(args),
            None => Err(format!("Unknown action: {}", message.name)),
        };
        match outcome {
            Ok(output) => vec![
                reply(1, MessageBody::Data(output)),
                reply(2, MessageBody::Status(FlowStatus::ok())),
            ],
            Err(error) => {
                warn!("Action {} failed: {}", message.name, error);
                vec![reply(1, MessageBody::Status(FlowStatus::error(error)))]
            }
        }
    }

    /// Handle inbox messages until shutdown or until the loop goes away.
    pub async fn run(
        self,
        mut inbox: mpsc::UnboundedReceiver<Message>,
        handle: AgentHandle,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                message = inbox.recv() => {
                    let Some(message) = message else {
                        info!("Transport loop closed, task worker exiting");
                        return;
                    };
                    for reply in self.replies_for(&message) {
                        if handle.send(reply).is_err() {
                            return;
                        }
                    }
                    handle.message_handled();
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}
