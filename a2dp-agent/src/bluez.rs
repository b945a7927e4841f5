/*!
 * BlueZ D-Bus Client
 * Adapter discoverability and agent registration via org.bluez
 */

use async_trait::async_trait;
use dbus::nonblock::stdintf::org_freedesktop_dbus::Properties;
use dbus::nonblock::{Proxy, SyncConnection};
use dbus::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::agent;
use crate::error::{AgentError, AgentResult};
use crate::policy::PolicyResponder;

pub const BLUEZ_SERVICE: &str = "org.bluez";
pub const BLUEZ_ROOT: &str = "/org/bluez";
const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
const AGENT_MANAGER_INTERFACE: &str = "org.bluez.AgentManager1";

/// IO capability announced to the agent manager: no display, no input.
pub const AGENT_CAPABILITY: &str = "NoInputNoOutput";

/// Object path of a local adapter, e.g. `hci0` -> `/org/bluez/hci0`.
pub fn adapter_path(adapter: &str) -> String {
    format!("{}/{}", BLUEZ_ROOT, adapter.trim_start_matches('/'))
}

/// Validated adapter object path. Names that cannot form a D-Bus path
/// (MAC addresses, empty strings) cannot name an adapter either.
pub fn adapter_object_path(adapter: &str) -> AgentResult<Path<'static>> {
    Path::new(adapter_path(adapter)).map_err(|reason| AgentError::AdapterNotFound {
        adapter: adapter.to_string(),
        source: dbus::Error::new_custom("org.freedesktop.DBus.Error.InvalidArgs", &reason),
    })
}

/// Operations the agent needs from the Bluetooth daemon.
#[async_trait]
pub trait AgentBus: Send + Sync {
    /// Confirms the adapter exists and returns its Bluetooth address.
    async fn resolve_adapter(&self, adapter: &str) -> AgentResult<String>;

    /// Makes the adapter discoverable with no timeout.
    async fn make_discoverable(&self, adapter: &str) -> AgentResult<()>;

    fn export_agent(&self, path: &str, responder: PolicyResponder) -> AgentResult<()>;

    async fn register_agent(&self, path: &str, capability: &str) -> AgentResult<()>;

    async fn request_default_agent(&self, path: &str) -> AgentResult<()>;

    /// Resolves once the bus connection is gone, with the reason.
    async fn disconnected(&mut self) -> String;
}

pub struct SystemBus {
    conn: Arc<SyncConnection>,
    io: Option<JoinHandle<String>>,
    timeout: Duration,
}

impl SystemBus {
    /// Opens the system bus and drives its I/O on a background task.
    pub async fn connect(timeout: Duration) -> AgentResult<Self> {
        let (resource, conn) =
            dbus_tokio::connection::new_system_sync().map_err(AgentError::BusConnect)?;

        let io = tokio::spawn(async move {
            let err = resource.await;
            err.to_string()
        });

        tracing::debug!("System bus unique name: {}", conn.unique_name());

        Ok(Self {
            conn,
            io: Some(io),
            timeout,
        })
    }

    fn proxy(&self, path: Path<'static>) -> Proxy<'static, Arc<SyncConnection>> {
        Proxy::new(BLUEZ_SERVICE, path, self.timeout, self.conn.clone())
    }
}

fn object_path(path: &str) -> AgentResult<Path<'static>> {
    Path::new(path.to_string()).map_err(|reason| AgentError::Export {
        path: path.to_string(),
        reason,
    })
}

#[async_trait]
impl AgentBus for SystemBus {
    async fn resolve_adapter(&self, adapter: &str) -> AgentResult<String> {
        self.proxy(adapter_object_path(adapter)?)
            .get::<String>(ADAPTER_INTERFACE, "Address")
            .await
            .map_err(|source| AgentError::AdapterNotFound {
                adapter: adapter.to_string(),
                source,
            })
    }

    async fn make_discoverable(&self, adapter: &str) -> AgentResult<()> {
        let proxy = self.proxy(adapter_object_path(adapter)?);
        let rejected = |property: &'static str| {
            move |source: dbus::Error| AgentError::Property {
                adapter: adapter.to_string(),
                property,
                source,
            }
        };

        proxy
            .set(ADAPTER_INTERFACE, "DiscoverableTimeout", 0u32)
            .await
            .map_err(rejected("DiscoverableTimeout"))?;
        proxy
            .set(ADAPTER_INTERFACE, "Discoverable", true)
            .await
            .map_err(rejected("Discoverable"))?;
        Ok(())
    }

    fn export_agent(&self, path: &str, responder: PolicyResponder) -> AgentResult<()> {
        // The receive token is never released; the agent lives as long as the connection.
        let token = agent::export(&self.conn, object_path(path)?, responder);
        tracing::debug!("Agent exported with receive token {}", token.0);
        Ok(())
    }

    async fn register_agent(&self, path: &str, capability: &str) -> AgentResult<()> {
        self.proxy(Path::from(BLUEZ_ROOT))
            .method_call::<(), _, _, _>(
                AGENT_MANAGER_INTERFACE,
                "RegisterAgent",
                (object_path(path)?, capability),
            )
            .await
            .map_err(|source| AgentError::Registration {
                call: "RegisterAgent",
                path: path.to_string(),
                source,
            })
    }

    async fn request_default_agent(&self, path: &str) -> AgentResult<()> {
        self.proxy(Path::from(BLUEZ_ROOT))
            .method_call::<(), _, _, _>(
                AGENT_MANAGER_INTERFACE,
                "RequestDefaultAgent",
                (object_path(path)?,),
            )
            .await
            .map_err(|source| AgentError::Registration {
                call: "RequestDefaultAgent",
                path: path.to_string(),
                source,
            })
    }

    async fn disconnected(&mut self) -> String {
        match self.io.take() {
            Some(io) => match io.await {
                Ok(reason) => reason,
                Err(e) => format!("bus task failed: {}", e),
            },
            None => std::future::pending().await,
        }
    }
}
