//! Window clients the worker can focus or open.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::RwLock;
use url::Url;

use crate::ServiceWorkerError;

/// Clients registry shared between handlers.
pub type SharedClients = Arc<RwLock<Clients>>;

/// Unique identifier for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
}

/// A client (controlled page).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: ClientId,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,
}

impl Client {
    /// A window client at `url`.
    pub fn window(url: Url) -> Self {
        Self {
            id: ClientId::new(),
            url,
            client_type: ClientType::Window,
            focused: false,
        }
    }
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<ClientId, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap for sharing between handlers.
    pub fn into_shared(self) -> SharedClients {
        Arc::new(RwLock::new(self))
    }

    /// Get a client by ID.
    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// All clients of the given type.
    pub fn match_all(&self, client_type: ClientType) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| c.client_type == client_type)
            .collect()
    }

    /// A window client already showing `url`.
    pub fn find_window(&self, url: &Url) -> Option<ClientId> {
        self.clients
            .values()
            .find(|c| c.client_type == ClientType::Window && c.url == *url)
            .map(|c| c.id)
    }

    /// Open a focused window at `url`.
    pub fn open_window(&mut self, url: Url) -> Client {
        let mut client = Client::window(url);
        self.blur_all();
        client.focused = true;
        self.clients.insert(client.id, client.clone());
        client
    }

    /// Focus a window client.
    pub fn focus(&mut self, id: ClientId) -> Result<(), ServiceWorkerError> {
        match self.clients.get(&id) {
            None => return Err(ServiceWorkerError::NotFound(format!("client {id:?}"))),
            Some(c) if c.client_type != ClientType::Window => {
                return Err(ServiceWorkerError::State(
                    "Can only focus window clients".to_string(),
                ));
            }
            Some(_) => {}
        }

        self.blur_all();
        if let Some(client) = self.clients.get_mut(&id) {
            client.focused = true;
        }
        Ok(())
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id, client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        self.clients.remove(&id)
    }

    /// Number of clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether there are no clients.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn blur_all(&mut self) {
        for client in self.clients.values_mut() {
            client.focused = false;
        }
    }
}
