//! Component-side glue built on the transport.

pub mod anonymous_channel_client;

pub use anonymous_channel_client::{AnonymousChannelClient, ClientError, ClientState};
