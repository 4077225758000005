// huesync-api: Async Rust client for the Philips Hue bridge CLIP v2 API and push-event stream

pub mod bus;
pub mod config;
pub mod error;
pub mod event_stream;
pub mod gateway;
pub mod models;
pub mod timer;
pub mod transport;

pub use bus::{EventBus, Subscription, SubscriptionSet};
pub use config::{BridgeConfig, BridgeUrls};
pub use error::Error;
pub use event_stream::{
    EventStreamReader, ReaderEvent, ReaderState, ReconnectPolicy, RecordParser, StopReason,
};
pub use gateway::{
    APPLICATION_KEY_HEADER, BridgeEvent, BridgeGateway, MAX_ATTEMPTS, RequestDescriptor,
    RequestKind, RequestOutcome,
};
pub use models::{AreaStatus, Channel, EntertainmentArea, Position};
pub use timer::TimerSet;
pub use transport::{TlsMode, TransportConfig};
