use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("message not found: {0}")]
    UnknownMessage(String),

    #[error("message {0} is not an assistant reply to a user message")]
    NotRegenerable(String),
}
