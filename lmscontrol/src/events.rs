use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::model::{PlayerInfo, PlaytimeInfo, ScanUpdate, ServerStatus, StatusResult};

/// Everything the controller tells its consumers.
#[derive(Clone, Debug)]
pub enum ControllerEvent {
    /// The selected player changed. Never fired when the same player is reselected.
    PlayerSelected {
        player: PlayerInfo,
        previous: Option<PlayerInfo>,
    },
    /// Every successful server-status poll.
    ServerStatus(Arc<ServerStatus>),
    /// The playlist needs repainting. Only fired while a playlist view is attached.
    PlaylistChange(Arc<StatusResult>),
    /// Every successful player poll, whatever the diff decided.
    ButtonUpdate(Arc<StatusResult>),
    /// The player status record was replaced.
    PlayerStateChange(Arc<StatusResult>),
    PlaytimeUpdate(PlaytimeInfo),
    /// A transient one-line message. Consecutive duplicates are dropped.
    ShowBriefly(String),
    /// The server's rescan flag flipped.
    ScannerUpdate(ScanUpdate),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    PlayerSelected,
    ServerStatus,
    PlaylistChange,
    ButtonUpdate,
    PlayerStateChange,
    PlaytimeUpdate,
    ShowBriefly,
    ScannerUpdate,
}

impl ControllerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ControllerEvent::PlayerSelected { .. } => EventKind::PlayerSelected,
            ControllerEvent::ServerStatus(_) => EventKind::ServerStatus,
            ControllerEvent::PlaylistChange(_) => EventKind::PlaylistChange,
            ControllerEvent::ButtonUpdate(_) => EventKind::ButtonUpdate,
            ControllerEvent::PlayerStateChange(_) => EventKind::PlayerStateChange,
            ControllerEvent::PlaytimeUpdate(_) => EventKind::PlaytimeUpdate,
            ControllerEvent::ShowBriefly(_) => EventKind::ShowBriefly,
            ControllerEvent::ScannerUpdate(_) => EventKind::ScannerUpdate,
        }
    }
}

struct Subscriber {
    kinds: Option<Vec<EventKind>>,
    tx: Sender<ControllerEvent>,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        match &self.kinds {
            Some(kinds) => kinds.contains(&kind),
            None => true,
        }
    }
}

/// Fan-out of controller events to any number of subscribers.
///
/// Each subscriber owns an unbounded channel; a subscriber whose receiver
/// was dropped is pruned on the next broadcast.
#[derive(Clone, Default)]
pub struct ControllerEventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl std::fmt::Debug for ControllerEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ControllerEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Receives every event.
    pub fn subscribe(&self) -> Receiver<ControllerEvent> {
        self.register(None)
    }

    /// Receives only the listed kinds.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> Receiver<ControllerEvent> {
        self.register(Some(kinds.to_vec()))
    }

    fn register(&self, kinds: Option<Vec<EventKind>>) -> Receiver<ControllerEvent> {
        let (tx, rx) = unbounded::<ControllerEvent>();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { kinds, tx });
        rx
    }

    pub fn broadcast(&self, event: ControllerEvent) {
        let kind = event.kind();
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sub| !sub.wants(kind) || sub.tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
