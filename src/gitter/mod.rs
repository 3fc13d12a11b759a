// ABOUTME: Gitter provider integration: payload model, client contract, and the HTTP client.
// ABOUTME: The puppet depends only on the GitterApi/GitterConnector traits so tests can script the provider.

pub mod api;
pub mod http;
pub mod model;

pub use api::{list_visible_rooms, GitterApi, GitterConnector, RoomEvents};
pub use http::{GitterClient, HttpConnector};
pub use model::{
    GitterMessage, GitterRoom, GitterUser, MessageOperation, RoomMessageEvent, RoomMessagePayload,
};
