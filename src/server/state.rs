use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;
use subtle::ConstantTimeEq;

use crate::auction::Selection;
use crate::config::ServerConfig;
use crate::engine::Adbot;
use crate::server::error::ServerResult;

/// Sends one notice to every control room.
pub type Broadcast = Arc<dyn Fn(&str) + Send + Sync>;

/// A selection handed out with `deliver: false`, waiting to be confirmed.
#[derive(Clone, Debug)]
pub struct PendingSelection {
    pub room: String,
    pub audience: u64,
    pub selection: Selection,
    issued: Instant,
}

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,

    pub bot: Arc<Adbot>,

    /// Room -> messages seen since the room's last delivered ad.
    cooldowns: Arc<DashMap<String, u64>>,

    /// Token -> selection the engine produced but nobody has billed yet.
    pending: Arc<DashMap<String, PendingSelection>>,

    broadcast: Broadcast,

    /// Render handle for `GET /metrics`, when a recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl ServerState {
    pub fn new(config: ServerConfig, bot: Arc<Adbot>) -> Self {
        let rooms = config.control_rooms.clone();
        Self {
            config: Arc::new(config),
            bot,
            cooldowns: Arc::new(DashMap::new()),
            pending: Arc::new(DashMap::new()),
            broadcast: log_broadcast(rooms),
            prometheus: None,
        }
    }

    pub fn with_broadcast(mut self, broadcast: Broadcast) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Authentication is off when no keys are configured.
    pub fn auth_required(&self) -> bool {
        !self.config.api_keys.is_empty()
    }

    /// Compares against every configured key without short-circuiting.
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        let mut found = 0u8;
        for candidate in &self.config.api_keys {
            found |= candidate.as_bytes().ct_eq(key.as_bytes()).unwrap_u8();
        }
        found == 1
    }

    pub fn cooldown(&self, room: &str) -> u64 {
        self.cooldowns.get(room).map(|count| *count).unwrap_or(0)
    }

    /// Count a message that carried no ad.
    pub fn bump_cooldown(&self, room: &str) -> u64 {
        let mut count = self.cooldowns.entry(room.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset_cooldown(&self, room: &str) {
        self.cooldowns.insert(room.to_string(), 0);
    }

    /// Park a selection until its delivery is confirmed and return the
    /// one-time token that claims it. Expired entries are dropped first.
    pub fn issue_pending(&self, room: &str, audience: u64, selection: Selection) -> String {
        let ttl = self.config.pending_ttl();
        self.pending.retain(|_, pending| pending.issued.elapsed() < ttl);
        let token = uuid::Uuid::new_v4().to_string();
        self.pending.insert(
            token.clone(),
            PendingSelection {
                room: room.to_string(),
                audience,
                selection,
                issued: Instant::now(),
            },
        );
        token
    }

    /// Remove and return the selection behind `token`. Unknown, used and
    /// expired tokens all yield `None`.
    pub fn claim_pending(&self, token: &str) -> Option<PendingSelection> {
        let (_, pending) = self.pending.remove(token)?;
        (pending.issued.elapsed() < self.config.pending_ttl()).then_some(pending)
    }

    pub fn broadcast(&self, notice: &str) {
        (self.broadcast)(notice);
    }

    /// Run a store operation off the async workers.
    pub async fn blocking<T, F>(&self, f: F) -> ServerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Adbot) -> Result<T, crate::error::AdbotError> + Send + 'static,
    {
        let bot = self.bot.clone();
        let result = tokio::task::spawn_blocking(move || f(&*bot)).await?;
        Ok(result?)
    }
}

/// Default broadcast: log the notice once per configured control room.
fn log_broadcast(rooms: Vec<String>) -> Broadcast {
    Arc::new(move |notice: &str| {
        for room in &rooms {
            tracing::info!(control_room = %room, notice, "control notice");
        }
    })
}
