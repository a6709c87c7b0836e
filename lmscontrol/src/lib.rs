//! # lmscontrol
//!
//! Client-side synchronization engine for a networked media player control
//! surface. The server does not push updates, so a set of cooperating
//! polling observers keeps a local copy of the selected player's state in
//! step with it, and publishes typed events to any number of consumers.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lmscontrol::{Controller, ControllerEvent, ControllerSettings, HttpTransport};
//!
//! # #[tokio::main]
//! # async fn main() -> lmscontrol::Result<()> {
//! let settings = ControllerSettings::default().with_server_url("http://lms.local:9000/");
//! let controller = Controller::new(settings, Arc::new(HttpTransport::new()))?;
//! let events = controller.subscribe();
//! controller.start();
//!
//! for event in events.iter() {
//!     if let ControllerEvent::PlaytimeUpdate(playtime) = event {
//!         println!("{} {}", playtime.elapsed_label(), playtime.remaining_label());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config_ext;
pub mod controller;
pub mod diff;
pub mod drag;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod model;
pub mod observer;
pub mod store;
pub mod ticker;
pub mod time_utils;

pub use command::{Command, Seek, StatusDetail, Volume};
pub use config_ext::{ControllerConfigExt, ControllerSettings};
pub use controller::{
    Controller, PLAYER_STATUS_OBSERVER, PLAYTIME_TICKER, SERVER_STATUS_OBSERVER, VolumeDirection,
};
pub use diff::{StatusField, needs_update};
pub use drag::{
    DragState, DragSuppressor, DropIndicator, DropSlot, PlaylistMove, PlaylistRow, SortableList,
};
pub use errors::{ControlError, Result};
pub use events::{ControllerEvent, ControllerEventBus, EventKind};
pub use gateway::{
    HttpRequest, HttpTransport, Reply, RequestConfig, RequestGateway, Scope, Transport,
};
pub use model::{
    Mode, PlayerId, PlayerInfo, PlayerStatus, PlaylistEntry, PlaytimeInfo, Power, RepeatMode,
    ScanUpdate, ServerStatus, StatusResult,
};
pub use observer::{Observer, ObserverPatch, ObserverScheduler, ObserverTask};
pub use store::PlayerStatusStore;
pub use time_utils::format_time;
