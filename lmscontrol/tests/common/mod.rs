//! In-process stand-in for a media server, answering RPC envelopes from canned state.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lmscontrol::{ControlError, Controller, ControllerSettings, HttpRequest, Result, Transport};
use serde_json::{Value, json};

pub const KITCHEN: &str = "00:04:20:aa:bb:cc";
pub const OFFICE: &str = "00:04:20:dd:ee:ff";

#[derive(Default)]
struct State {
    server_status: Value,
    players: HashMap<String, Value>,
    calls: Vec<(String, Vec<Value>)>,
    offline: bool,
    latency: Duration,
    command_reply: Value,
    pages: Vec<String>,
    pages_fail: bool,
}

#[derive(Default)]
pub struct FakeServer {
    state: Mutex<State>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        let server = Arc::new(Self::default());
        server.set_server_status(json!({
            "rescan": 0,
            "player count": 2,
            "players_loop": [
                { "playerid": KITCHEN, "name": "Kitchen", "connected": 1, "power": 1 },
                { "playerid": OFFICE, "name": "Office", "connected": 1, "power": 0 }
            ]
        }));
        server.set_player_status(KITCHEN, player_status("Kitchen", "So What", 1000.0));
        server.set_player_status(OFFICE, player_status("Office", "Giant Steps", 2000.0));
        server
    }

    pub fn set_server_status(&self, status: Value) {
        self.state.lock().unwrap().server_status = status;
    }

    pub fn update_server_status(&self, update: impl FnOnce(&mut Value)) {
        update(&mut self.state.lock().unwrap().server_status);
    }

    pub fn set_player_status(&self, player: &str, status: Value) {
        self.state
            .lock()
            .unwrap()
            .players
            .insert(player.to_string(), status);
    }

    pub fn update_player_status(&self, player: &str, update: impl FnOnce(&mut Value)) {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.players.get_mut(player) {
            update(status);
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = latency;
    }

    pub fn set_command_reply(&self, reply: Value) {
        self.state.lock().unwrap().command_reply = reply;
    }

    /// Makes every locator GET fail while RPC calls keep working.
    pub fn set_pages_fail(&self, fail: bool) {
        self.state.lock().unwrap().pages_fail = fail;
    }

    /// Paths and queries of the locator GETs received so far.
    pub fn pages(&self) -> Vec<String> {
        self.state.lock().unwrap().pages.clone()
    }

    /// Every (scope, command) received so far.
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_named(&self, name: &str) -> Vec<(String, Vec<Value>)> {
        self.calls()
            .into_iter()
            .filter(|(_, command)| command.first() == Some(&json!(name)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn answer(&self, scope: &str, command: &[Value]) -> Value {
        let mut state = self.state.lock().unwrap();
        match command.first().and_then(Value::as_str) {
            Some("serverstatus") => state.server_status.clone(),
            Some("status") => state.players.get(scope).cloned().unwrap_or(Value::Null),
            Some("playlist") => {
                // any playlist edit is a new revision
                if let Some(status) = state.players.get_mut(scope) {
                    let revision = status["playlist_timestamp"].as_f64().unwrap_or(0.0);
                    status["playlist_timestamp"] = json!(revision + 1.0);
                }
                state.command_reply.clone()
            }
            _ => state.command_reply.clone(),
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(&self, request: HttpRequest) -> Result<String> {
        let (offline, latency) = {
            let state = self.state.lock().unwrap();
            (state.offline, state.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if offline {
            return Err(ControlError::transport("connection refused"));
        }

        let Some(body) = request.body else {
            let mut state = self.state.lock().unwrap();
            let page = match request.url.query() {
                Some(query) => format!("{}?{}", request.url.path(), query),
                None => request.url.path().to_string(),
            };
            state.pages.push(page);
            if state.pages_fail {
                return Err(ControlError::HttpStatus {
                    url: request.url.to_string(),
                    status: 500,
                });
            }
            return Ok("<html></html>".to_string());
        };
        let envelope: Value = serde_json::from_str(&body)?;
        let scope = envelope["params"][0].as_str().unwrap_or_default().to_string();
        let command = envelope["params"][1].as_array().cloned().unwrap_or_default();

        self.state
            .lock()
            .unwrap()
            .calls
            .push((scope.clone(), command.clone()));

        let result = self.answer(&scope, &command);
        Ok(json!({ "id": 1, "method": "slim.request", "result": result }).to_string())
    }
}

/// Status of a connected player in play mode, first of four tracks.
pub fn player_status(name: &str, title: &str, revision: f64) -> Value {
    json!({
        "player_name": name,
        "player_connected": 1,
        "power": 1,
        "mode": "play",
        "rate": 1,
        "time": 10.4,
        "duration": 540.2,
        "can_seek": 1,
        "playlist repeat": 0,
        "playlist_cur_index": "0",
        "playlist_timestamp": revision,
        "playlist_tracks": 4,
        "rescan": 0,
        "playlist_loop": [
            { "playlist index": 0, "title": title, "url": format!("file:///music/{title}.flac") }
        ]
    })
}

pub fn controller(server: &Arc<FakeServer>) -> Controller {
    Controller::new(ControllerSettings::default(), server.clone()).unwrap()
}

/// Lets spawned observers run until the clock reaches `ms` milliseconds from now.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
