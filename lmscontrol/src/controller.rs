//! The controller: one synchronization context per session.
//!
//! It owns the request gateway, the player status store, the event bus and
//! the three observers that keep everything in step with the server:
//!
//! - `playerstatus` polls the cheap status of the selected player, runs the
//!   diff and triggers a full refresh when something changed;
//! - `serverstatus` polls the player list and the scanner state, and picks
//!   the active player;
//! - `playtimeticker` interpolates the elapsed time between two polls.
//!
//! Observers hold a weak reference to the controller, so dropping the last
//! [`Controller`] handle (or calling [`Controller::shutdown`]) ends them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::Receiver;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::command::{Command, StatusDetail, Volume};
use crate::config_ext::ControllerSettings;
use crate::drag::PlaylistMove;
use crate::errors::{ControlError, Result};
use crate::events::{ControllerEvent, ControllerEventBus, EventKind};
use crate::gateway::{Reply, RequestConfig, RequestGateway, Scope, Transport};
use crate::model::{PlayerId, PlayerInfo, PlayerStatus, ScanUpdate, ServerStatus, StatusResult};
use crate::observer::{Observer, ObserverScheduler, ObserverTask};
use crate::store::PlayerStatusStore;
use crate::ticker;

pub const PLAYER_STATUS_OBSERVER: &str = "playerstatus";
pub const SERVER_STATUS_OBSERVER: &str = "serverstatus";
pub const PLAYTIME_TICKER: &str = "playtimeticker";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeDirection {
    Up,
    Down,
}

struct Inner {
    gateway: RequestGateway,
    store: Mutex<PlayerStatusStore>,
    bus: ControllerEventBus,
    scheduler: ObserverScheduler,
    selection: Mutex<Option<PlayerInfo>>,
    brief_cache: Mutex<String>,
    playlist_view: AtomicBool,
    settings: ControllerSettings,
}

/// Cheap to clone handle on a synchronization context.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("gateway", &self.inner.gateway)
            .field("observers", &self.inner.scheduler.names())
            .field("bus", &self.inner.bus)
            .finish()
    }
}

impl Controller {
    /// Builds a controller; nothing is polled until [`start`](Self::start).
    pub fn new(settings: ControllerSettings, transport: Arc<dyn Transport>) -> Result<Self> {
        let gateway = RequestGateway::new(transport, &settings.server_url)?
            .with_rpc_path(&settings.rpc_path)
            .with_timeout(settings.request_timeout);

        Ok(Self {
            inner: Arc::new(Inner {
                gateway,
                store: Mutex::new(PlayerStatusStore::new()),
                bus: ControllerEventBus::new(),
                scheduler: ObserverScheduler::new(),
                selection: Mutex::new(None),
                brief_cache: Mutex::new(String::new()),
                playlist_view: AtomicBool::new(false),
                settings,
            }),
        })
    }

    /// Registers the three observers; each runs once right away.
    ///
    /// Must be called from within a Tokio runtime. Calling it again is harmless.
    pub fn start(&self) {
        let settings = &self.inner.settings;
        let weak = Arc::downgrade(&self.inner);
        let scheduler = &self.inner.scheduler;

        scheduler.add_observer(
            PLAYER_STATUS_OBSERVER,
            settings.player_status,
            Arc::new(PlayerStatusObserver(weak.clone())),
        );
        scheduler.add_observer(
            SERVER_STATUS_OBSERVER,
            settings.server_status,
            Arc::new(ServerStatusObserver(weak.clone())),
        );
        scheduler.add_observer(
            PLAYTIME_TICKER,
            settings.playtime_tick,
            Arc::new(PlaytimeTickerObserver(weak)),
        );
    }

    /// Cancels every pending observer timer. In-flight requests complete and are ignored.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.inner.settings
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.inner.gateway
    }

    pub fn scheduler(&self) -> &ObserverScheduler {
        &self.inner.scheduler
    }

    pub fn bus(&self) -> &ControllerEventBus {
        &self.inner.bus
    }

    pub fn subscribe(&self) -> Receiver<ControllerEvent> {
        self.inner.bus.subscribe()
    }

    pub fn subscribe_to(&self, kinds: &[EventKind]) -> Receiver<ControllerEvent> {
        self.inner.bus.subscribe_to(kinds)
    }

    /// Declares whether a playlist view consumes playlist-change events.
    pub fn attach_playlist_view(&self, attached: bool) {
        self.inner.playlist_view.store(attached, Ordering::SeqCst);
    }

    pub fn has_playlist_view(&self) -> bool {
        self.inner.playlist_view.load(Ordering::SeqCst)
    }

    /// Snapshot of the player status.
    pub fn status(&self) -> PlayerStatus {
        self.store().snapshot()
    }

    pub fn is_local_mutation_pending(&self) -> bool {
        self.store().is_local_mutation_pending()
    }

    pub fn selected_player(&self) -> Option<PlayerInfo> {
        self.selection().clone()
    }

    pub fn selected_player_id(&self) -> Option<PlayerId> {
        self.inner.gateway.selected_player()
    }

    /// Call with the store lock held: a player switch resets the store under
    /// that lock, so a result checked here cannot land after the reset.
    fn is_selected(&self, player: &PlayerId) -> bool {
        self.selected_player_id().as_ref() == Some(player)
    }

    fn store(&self) -> MutexGuard<'_, PlayerStatusStore> {
        self.inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn selection(&self) -> MutexGuard<'_, Option<PlayerInfo>> {
        self.inner
            .selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Player selection
    // =========================================================================

    /// Selects a player, or clears the selection with `None`.
    ///
    /// Selecting a different player discards the player status and fires
    /// `PlayerSelected` once, then force-fires every observer. Reselecting
    /// the current player only refreshes its descriptor. Returns true when
    /// the selection changed.
    pub fn select_player(&self, player: Option<PlayerInfo>) -> bool {
        let Some(player) = player else {
            let previous = self.selection().take();
            {
                let mut store = self.store();
                self.inner.gateway.set_player(None);
                store.reset();
            }
            if let Some(previous) = previous {
                info!(player = %previous.playerid, "Player deselected");
            }
            return false;
        };

        let previous = {
            let mut selection = self.selection();
            if selection.as_ref().map(|p| &p.playerid) == Some(&player.playerid) {
                *selection = Some(player);
                return false;
            }
            selection.replace(player.clone())
        };

        {
            let mut store = self.store();
            self.inner.gateway.set_player(Some(player.playerid.clone()));
            store.reset();
        }
        info!(
            player = %player.playerid,
            name = player.name.as_deref().unwrap_or(""),
            "Player selected"
        );

        self.inner.bus.broadcast(ControllerEvent::PlayerSelected { player, previous });
        self.update_all();
        true
    }

    /// Asks the server for its player list and selects `id` from it.
    ///
    /// The status is reset before the request goes out. An unknown
    /// identifier clears the selection. Returns true when `id` is selected.
    pub async fn select_player_by_id(&self, id: &PlayerId) -> Result<bool> {
        self.store().reset();

        let value = self
            .inner
            .gateway
            .rpc(Scope::Global, Command::server_status())
            .await?;
        let status: Option<ServerStatus> = value.and_then(|v| decode("serverstatus", v));
        let found = status.as_ref().and_then(|s| s.find_player(id)).cloned();

        match found {
            Some(player) => {
                self.select_player(Some(player));
                Ok(true)
            }
            None => {
                warn!(player = %id, "Player not found on server");
                self.select_player(None);
                Ok(false)
            }
        }
    }

    /// Applies the player list of a server status: keep the current player
    /// if still listed, else the preferred one, else the first one.
    fn choose_player(&self, status: &ServerStatus) {
        let current = self.selected_player_id();
        let preferred = self.inner.settings.preferred_player.as_ref();

        let chosen = current
            .as_ref()
            .and_then(|id| status.find_player(id))
            .or_else(|| preferred.and_then(|id| status.find_player(id)))
            .or_else(|| status.players_loop.first())
            .cloned();

        match chosen {
            Some(player) => {
                self.select_player(Some(player));
            }
            None => {
                if current.is_some() {
                    debug!("No player left on server");
                }
                self.select_player(None);
            }
        }
    }

    /// Forgets the power state and fires every observer now.
    pub fn update_all(&self) {
        self.store().reset_power_sentinel();
        self.inner.scheduler.fire_all();
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// One cycle of the player-status observer.
    ///
    /// Returns true when the diff asked for, and got, a full refresh.
    pub async fn poll_player_status(&self) -> bool {
        let Some(player) = self.selected_player_id() else {
            return false;
        };

        let value = match self
            .inner
            .gateway
            .rpc(Scope::Player(player.clone()), Command::Status(StatusDetail::Summary))
            .await
        {
            Ok(Some(value)) => value,
            Ok(None) => return false,
            Err(err) => {
                debug!(player = %player, error = %err, "Player status poll failed");
                return false;
            }
        };

        if !self.is_selected(&player) {
            debug!(player = %player, "Discarding status of a deselected player");
            return false;
        }

        let Some(result) = decode::<StatusResult>("status", value) else {
            return false;
        };
        let result = Arc::new(result);
        let mut refreshed = false;

        if result.player_connected {
            self.inner
                .bus
                .broadcast(ControllerEvent::ButtonUpdate(result.clone()));

            let needs_update = {
                let mut store = self.store();
                if !self.is_selected(&player) {
                    return false;
                }
                store.sync_playtime(&result);
                store.evaluate(&result)
            };
            debug!(player = %player, needs_update, "Player status polled");

            if needs_update {
                self.refresh_status().await;
                refreshed = true;
            }

            if result.player_needs_upgrade && !result.player_is_upgrading {
                self.inner
                    .bus
                    .broadcast(ControllerEvent::PlaylistChange(result.clone()));
            }
        }

        self.show_briefly_lines(&result.show_briefly);
        self.observe_rescan(ScanUpdate::from(result.as_ref()));
        refreshed
    }

    /// One cycle of the server-status observer.
    pub async fn poll_server_status(&self) {
        let value = match self
            .inner
            .gateway
            .rpc(Scope::Global, Command::server_status())
            .await
        {
            Ok(Some(value)) => value,
            Ok(None) => return,
            Err(err) => {
                debug!(error = %err, "Server status poll failed");
                return;
            }
        };

        let Some(status) = decode::<ServerStatus>("serverstatus", value) else {
            return;
        };
        let status = Arc::new(status);
        debug!(players = status.players_loop.len(), rescan = status.rescan, "Server status polled");

        self.choose_player(&status);
        self.inner
            .bus
            .broadcast(ControllerEvent::ServerStatus(status.clone()));
        self.observe_rescan(ScanUpdate::from(status.as_ref()));

        if let Some(failed) = status.lastscanfailed.as_deref() {
            self.show_briefly(failed);
        }
    }

    /// Fires `ScannerUpdate` when the rescan flag flipped, and makes the
    /// server-status observer look again soon.
    pub fn observe_rescan(&self, update: ScanUpdate) -> bool {
        if !self.store().set_rescan(update.rescan) {
            return false;
        }
        info!(rescan = update.rescan, "Scanner state changed");
        self.inner
            .scheduler
            .delay(SERVER_STATUS_OBSERVER, self.inner.settings.scan_poll);
        self.inner
            .bus
            .broadcast(ControllerEvent::ScannerUpdate(update));
        true
    }

    /// Fetches the full status of the selected player and replaces the store with it.
    pub async fn refresh_status(&self) {
        let Some(player) = self.selected_player_id() else {
            return;
        };

        let value = match self
            .inner
            .gateway
            .rpc(Scope::Player(player.clone()), Command::Status(StatusDetail::Full))
            .await
        {
            Ok(Some(value)) => value,
            Ok(None) => return,
            Err(err) => {
                debug!(player = %player, error = %err, "Status refresh failed");
                return;
            }
        };

        let Some(result) = decode::<StatusResult>("status", value) else {
            return;
        };
        if !result.player_connected {
            return;
        }
        let result = Arc::new(result);

        let changed = {
            let mut store = self.store();
            if !self.is_selected(&player) {
                debug!(player = %player, "Discarding full status of a deselected player");
                return;
            }
            let changed = store.evaluate(&result);
            store.replace(&result);
            changed
        };

        self.inner
            .bus
            .broadcast(ControllerEvent::PlayerStateChange(result.clone()));
        if changed && self.has_playlist_view() {
            self.inner
                .bus
                .broadcast(ControllerEvent::PlaylistChange(result));
        }
    }

    fn tick_playtime(&self) {
        if self.selected_player_id().is_none() {
            return;
        }
        let tick = ticker::advance(self.store().status_mut());
        self.inner
            .bus
            .broadcast(ControllerEvent::PlaytimeUpdate(tick.info));
        if tick.refresh {
            // the next tick must not wait for the server
            let controller = self.clone();
            tokio::spawn(async move { controller.refresh_status().await });
        }
    }

    fn server_status_delay(&self) -> Option<Duration> {
        let idle = self.selected_player_id().is_some() && !self.store().status().rescan;
        idle.then_some(self.inner.settings.server_status_idle)
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Issues a request, surfacing its show-briefly text first.
    pub async fn request(&self, config: RequestConfig) -> Result<Reply> {
        if let Some(text) = config.show_briefly.as_deref() {
            self.show_briefly(text);
        }
        self.inner.gateway.request(config).await
    }

    /// Same as [`request`](Self::request) scoped to the selected player; `Ok(None)` without one.
    pub async fn player_request(&self, config: RequestConfig) -> Result<Option<Reply>> {
        if self.selected_player_id().is_none() {
            return Ok(None);
        }
        if let Some(text) = config.show_briefly.as_deref() {
            self.show_briefly(text);
        }
        self.inner.gateway.player_request(config).await
    }

    /// Sends a user-initiated command to the selected player.
    ///
    /// With `local_mutation` the change is assumed to be rendered already:
    /// the pending-local-mutation token is armed before the command goes
    /// out. A fresh status is fetched right after, and a `text` field of
    /// the answer is surfaced through show-briefly.
    pub async fn player_control(
        &self,
        command: Command,
        local_mutation: bool,
    ) -> Result<Option<Value>> {
        let Some(player) = self.selected_player_id() else {
            return Err(ControlError::NoPlayerSelected);
        };
        if local_mutation {
            self.store().arm_local_mutation();
        }

        let name = command.name().to_string();
        let reply = match self
            .inner
            .gateway
            .rpc(Scope::Player(player.clone()), command)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(player = %player, command = %name, error = %err, "Player command failed");
                return Err(err);
            }
        };

        self.refresh_status().await;

        if let Some(text) = reply
            .as_ref()
            .and_then(|r| r.get("text"))
            .and_then(Value::as_str)
        {
            self.show_briefly(text);
        }
        Ok(reply)
    }

    /// Commits a local drag reorder to the server.
    pub async fn commit_move(&self, moved: &PlaylistMove) -> Result<()> {
        self.player_control(
            Command::PlaylistMove {
                from: moved.from,
                to: moved.to,
            },
            true,
        )
        .await?;
        Ok(())
    }

    /// GET against a page-relative locator, optionally refreshing the status afterwards.
    ///
    /// The refresh happens whether the request succeeded or not.
    pub async fn url_request(
        &self,
        locator: &str,
        refresh: bool,
        show_briefly: Option<&str>,
    ) -> Result<String> {
        let mut config = RequestConfig::locator(locator);
        if let Some(text) = show_briefly {
            config = config.with_show_briefly(text);
        }

        let reply = self.request(config).await;
        if refresh {
            self.refresh_status().await;
        }

        match reply? {
            Reply::Body(body) => Ok(body),
            Reply::Rpc(_) => Ok(String::new()),
        }
    }

    /// Sets the volume from a 0..=10 step, or moves it by that many steps.
    pub async fn set_volume(
        &self,
        step: u32,
        direction: Option<VolumeDirection>,
    ) -> Result<Option<Value>> {
        let amount = step.saturating_mul(10);
        let volume = match direction {
            None => Volume::Absolute(amount),
            Some(VolumeDirection::Up) => Volume::Relative(amount.min(100) as i32),
            Some(VolumeDirection::Down) => Volume::Relative(-(amount.min(100) as i32)),
        };
        self.player_control(Command::MixerVolume(volume), false).await
    }

    // =========================================================================
    // Show-briefly
    // =========================================================================

    /// Surfaces a transient message; a repeat of the previous one is dropped.
    pub fn show_briefly(&self, text: &str) -> bool {
        self.show_briefly_lines(&[text])
    }

    /// Surfaces server-provided message lines.
    ///
    /// Lines that do not look like text are skipped, the others are joined
    /// with spaces. Returns true when an event was fired.
    pub fn show_briefly_lines<S: AsRef<str>>(&self, lines: &[S]) -> bool {
        let Some(text) = compose_brief(lines) else {
            return false;
        };

        {
            let mut cache = self
                .inner
                .brief_cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *cache == text {
                return false;
            }
            cache.clone_from(&text);
        }

        self.inner.bus.broadcast(ControllerEvent::ShowBriefly(text));
        true
    }
}

fn compose_brief<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    let accepted: Vec<&str> = lines
        .iter()
        .map(|line| line.as_ref())
        .filter(|line| line.chars().next().is_some_and(starts_text))
        .collect();
    if accepted.is_empty() {
        return None;
    }
    Some(accepted.join(" "))
}

fn starts_text(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c.is_whitespace() || ".;,:()[]%".contains(c)
}

fn decode<T: DeserializeOwned>(payload: &'static str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(payload, error = %err, "Ignoring malformed result");
            None
        }
    }
}

fn upgrade(inner: &Weak<Inner>) -> Option<Controller> {
    inner.upgrade().map(|inner| Controller { inner })
}

struct PlayerStatusObserver(Weak<Inner>);

#[async_trait]
impl ObserverTask for PlayerStatusObserver {
    async fn run(&self, _observer: &Observer) -> Option<Duration> {
        upgrade(&self.0)?.poll_player_status().await;
        None
    }
}

struct ServerStatusObserver(Weak<Inner>);

#[async_trait]
impl ObserverTask for ServerStatusObserver {
    async fn run(&self, _observer: &Observer) -> Option<Duration> {
        let controller = upgrade(&self.0)?;
        controller.poll_server_status().await;
        controller.server_status_delay()
    }
}

struct PlaytimeTickerObserver(Weak<Inner>);

#[async_trait]
impl ObserverTask for PlaytimeTickerObserver {
    async fn run(&self, _observer: &Observer) -> Option<Duration> {
        upgrade(&self.0)?.tick_playtime();
        None
    }
}
