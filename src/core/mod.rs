//! The worker, its event model, and the network seam.

pub mod event;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod messages;
pub mod models;
pub mod network;
pub mod push;
pub mod routing;
pub mod sync;
pub mod worker;

pub use event::{EventKind, ExtendableEvent};
pub use http::HttpNetwork;
pub use lifecycle::{Lifecycle, WorkerState};
pub use messages::{ControlMessage, MessageEvent, MessageReply};
pub use models::{FetchRequest, FetchResponse, RequestMode, ResponseType};
pub use network::Network;
pub use push::{
    Clients, HeadlessClients, LogNotifier, NotificationClick, NotificationDefaults,
    NotificationIntent, Notifier, PushPayload, WindowClient,
};
pub use routing::{Route, Router};
pub use sync::SyncReport;
pub use worker::{
    CacheWorker, CacheWorkerBuilder, FetchDisposition, ResponseSource, WorkerSettings,
};
