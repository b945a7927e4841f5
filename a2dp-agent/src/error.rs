use thiserror::Error;

/// Fatal startup failures. Any of these aborts the process.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to connect to the system bus: {0}")]
    BusConnect(#[source] dbus::Error),

    #[error("bluetooth adapter {adapter} not found")]
    AdapterNotFound {
        adapter: String,
        #[source]
        source: dbus::Error,
    },

    #[error("adapter {adapter} rejected property {property}")]
    Property {
        adapter: String,
        property: &'static str,
        #[source]
        source: dbus::Error,
    },

    #[error("failed to export agent at {path}: {reason}")]
    Export { path: String, reason: String },

    #[error("agent manager refused {call} for {path}")]
    Registration {
        call: &'static str,
        path: String,
        #[source]
        source: dbus::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
