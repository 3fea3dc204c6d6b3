pub mod event;
mod hub;

pub use event::WsEvent;
pub use hub::{HubMessage, SocketHub, OUTBOUND_CHANNEL_CAPACITY};
