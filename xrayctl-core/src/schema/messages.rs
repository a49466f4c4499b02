//! Statically-typed wire messages for the management service.
//!
//! Field numbers and types are the external contract with the proxy and
//! must match the descriptors in [`super::descriptors`]. Encoding and
//! decoding come from `prost::Message`
//! (`encode_to_vec` / `decode`).

use prost::{Message, Name};
use prost_types::Any;

pub(crate) const VLESS_PACKAGE: &str = "xray.proxy.vless";
pub(crate) const PROTOCOL_PACKAGE: &str = "xray.common.protocol";
pub(crate) const COMMAND_PACKAGE: &str = "xray.app.proxyman.command";

/// Prefix used when packing a payload without an explicit type URL.
pub const TYPE_URL_PREFIX: &str = "type.googleapis.com";

/// VLESS account credential material.
#[derive(Clone, PartialEq, Message)]
pub struct Account {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub flow: String,
    #[prost(string, tag = "3")]
    pub encryption: String,
}

impl Name for Account {
    const NAME: &'static str = "Account";
    const PACKAGE: &'static str = VLESS_PACKAGE;
}

impl Account {
    /// Pack into a type-tagged payload.
    ///
    /// An empty `type_url` falls back to `type.googleapis.com/<full name>`.
    pub fn pack(&self, type_url: &str) -> Any {
        let type_url = if type_url.is_empty() {
            format!("{}/{}", TYPE_URL_PREFIX, Self::full_name())
        } else {
            type_url.to_string()
        };
        Any {
            type_url,
            value: self.encode_to_vec(),
        }
    }

    /// Unpack from a type-tagged payload, ignoring the type URL.
    pub fn unpack(any: &Any) -> Result<Self, prost::DecodeError> {
        Self::decode(any.value.as_slice())
    }
}

/// A proxy user. `email` is the unique key within one inbound tag.
#[derive(Clone, PartialEq, Message)]
pub struct User {
    #[prost(string, tag = "1")]
    pub email: String,
    #[prost(uint32, tag = "2")]
    pub level: u32,
    #[prost(uint32, tag = "3")]
    pub alter_id: u32,
    #[prost(message, optional, tag = "4")]
    pub account: Option<Any>,
}

impl Name for User {
    const NAME: &'static str = "User";
    const PACKAGE: &'static str = PROTOCOL_PACKAGE;
}

#[derive(Clone, PartialEq, Message)]
pub struct AddUserRequest {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(message, optional, tag = "2")]
    pub user: Option<User>,
}

impl Name for AddUserRequest {
    const NAME: &'static str = "AddUserRequest";
    const PACKAGE: &'static str = COMMAND_PACKAGE;
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct AddUserResponse {}

impl Name for AddUserResponse {
    const NAME: &'static str = "AddUserResponse";
    const PACKAGE: &'static str = COMMAND_PACKAGE;
}

#[derive(Clone, PartialEq, Message)]
pub struct RemoveUserRequest {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(string, tag = "2")]
    pub email: String,
}

impl Name for RemoveUserRequest {
    const NAME: &'static str = "RemoveUserRequest";
    const PACKAGE: &'static str = COMMAND_PACKAGE;
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct RemoveUserResponse {}

impl Name for RemoveUserResponse {
    const NAME: &'static str = "RemoveUserResponse";
    const PACKAGE: &'static str = COMMAND_PACKAGE;
}
