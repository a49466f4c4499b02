//! Hand-assembled descriptor files for the management service.
//!
//! Three files mirror the proxy's own package split so the catalog can be
//! compared name-for-name with the proxy's schema.

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};

use super::messages::{COMMAND_PACKAGE, PROTOCOL_PACKAGE, VLESS_PACKAGE};

pub const VLESS_FILE: &str = "xray_proxy_vless.proto";
pub const PROTOCOL_FILE: &str = "xray_common_protocol.proto";
pub const COMMAND_FILE: &str = "xray_proxyman_command.proto";

const ANY_FILE: &str = "google/protobuf/any.proto";

fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..scalar(name, number, Type::Message)
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn file(
    name: &str,
    package: &str,
    dependency: Vec<String>,
    messages: Vec<DescriptorProto>,
) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: Some(package.to_string()),
        dependency,
        message_type: messages,
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

/// `xray.proxy.vless.Account`.
pub fn vless_file() -> FileDescriptorProto {
    file(
        VLESS_FILE,
        VLESS_PACKAGE,
        Vec::new(),
        vec![message(
            "Account",
            vec![
                scalar("id", 1, Type::String),
                scalar("flow", 2, Type::String),
                scalar("encryption", 3, Type::String),
            ],
        )],
    )
}

/// `xray.common.protocol.User`, with the account carried as `Any`.
pub fn protocol_file() -> FileDescriptorProto {
    file(
        PROTOCOL_FILE,
        PROTOCOL_PACKAGE,
        vec![ANY_FILE.to_string()],
        vec![message(
            "User",
            vec![
                scalar("email", 1, Type::String),
                scalar("level", 2, Type::Uint32),
                scalar("alter_id", 3, Type::Uint32),
                message_field("account", 4, ".google.protobuf.Any"),
            ],
        )],
    )
}

/// `xray.app.proxyman.command` request/response pairs.
pub fn command_file() -> FileDescriptorProto {
    file(
        COMMAND_FILE,
        COMMAND_PACKAGE,
        vec![PROTOCOL_FILE.to_string()],
        vec![
            message(
                "AddUserRequest",
                vec![
                    scalar("tag", 1, Type::String),
                    message_field("user", 2, ".xray.common.protocol.User"),
                ],
            ),
            message("AddUserResponse", Vec::new()),
            message(
                "RemoveUserRequest",
                vec![
                    scalar("tag", 1, Type::String),
                    scalar("email", 2, Type::String),
                ],
            ),
            message("RemoveUserResponse", Vec::new()),
        ],
    )
}
