//! Schema registry for the management wire format.
//!
//! No generated stubs exist for the proxy's management service, so the
//! message schemas are assembled by hand ([`descriptors`]) and bound to
//! static prost structs ([`messages`]). The descriptors live in a
//! process-wide catalog keyed by fully-qualified type name.
//!
//! Registration is idempotent and checked per schema name: any number of
//! clients may call [`ensure_registered`], and a concurrent or repeated
//! registration of a name already present is a no-op, not an error.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;
use prost::Name;
use prost_types::{DescriptorProto, FileDescriptorProto};
use tracing::debug;

use crate::error::ManagementError;

pub mod descriptors;
pub mod messages;

pub use messages::{
    Account, AddUserRequest, AddUserResponse, RemoveUserRequest, RemoveUserResponse, User,
};

static GLOBAL_CATALOG: LazyLock<SchemaCatalog> = LazyLock::new(SchemaCatalog::new);

/// The process-wide catalog, possibly still empty.
pub fn global() -> &'static SchemaCatalog {
    &GLOBAL_CATALOG
}

/// Register the management schemas into the process-wide catalog.
///
/// Safe to call from every client instance; only missing names are defined.
pub fn ensure_registered() -> &'static SchemaCatalog {
    GLOBAL_CATALOG.ensure_management_schemas();
    &GLOBAL_CATALOG
}

#[derive(Default)]
struct CatalogInner {
    files: HashMap<String, FileDescriptorProto>,
    messages: HashMap<String, DescriptorProto>,
}

/// Catalog of message descriptors keyed by fully-qualified name.
///
/// Read-mostly: writes only happen during registration.
#[derive(Default)]
pub struct SchemaCatalog {
    inner: RwLock<CatalogInner>,
}

impl SchemaCatalog {
    /// Create an empty catalog. Most callers want [`global`] instead.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every message of `file` under `<package>.<name>`.
    ///
    /// Names already in the catalog are skipped. Returns the number of
    /// messages newly registered.
    pub fn register_file(&self, file: FileDescriptorProto) -> usize {
        let mut inner = self.inner.write();
        let package = file.package().to_string();
        let mut added = 0;

        for message in &file.message_type {
            let full_name = if package.is_empty() {
                message.name().to_string()
            } else {
                format!("{}.{}", package, message.name())
            };
            if !inner.messages.contains_key(&full_name) {
                inner.messages.insert(full_name, message.clone());
                added += 1;
            }
        }

        inner.files.entry(file.name().to_string()).or_insert(file);
        added
    }

    /// Define the management schemas that are not yet present.
    ///
    /// Each descriptor file is only built when its marker type is missing.
    /// Returns the number of messages newly registered.
    pub fn ensure_management_schemas(&self) -> usize {
        let files: [(String, fn() -> FileDescriptorProto); 3] = [
            (Account::full_name(), descriptors::vless_file),
            (User::full_name(), descriptors::protocol_file),
            (AddUserRequest::full_name(), descriptors::command_file),
        ];

        let mut added = 0;
        for (marker, build) in files {
            if self.contains(&marker) {
                continue;
            }
            added += self.register_file(build());
        }

        if added > 0 {
            debug!(added, total = self.len(), "Registered management schemas");
        }
        added
    }

    /// Whether a message with this fully-qualified name is registered.
    pub fn contains(&self, full_name: &str) -> bool {
        self.inner.read().messages.contains_key(full_name)
    }

    /// Look up a message descriptor by fully-qualified name.
    pub fn message(&self, full_name: &str) -> Option<DescriptorProto> {
        self.inner.read().messages.get(full_name).cloned()
    }

    /// Look up a descriptor file by file name.
    pub fn file(&self, name: &str) -> Option<FileDescriptorProto> {
        self.inner.read().files.get(name).cloned()
    }

    /// Like [`message`](Self::message), but a missing schema is a
    /// configuration error.
    pub fn require(&self, full_name: &str) -> Result<DescriptorProto, ManagementError> {
        self.message(full_name).ok_or_else(|| {
            ManagementError::Configuration(format!("schema '{full_name}' is not registered"))
        })
    }

    /// `(field name, field number)` pairs of a registered message.
    pub fn field_numbers(&self, full_name: &str) -> Option<Vec<(String, i32)>> {
        self.message(full_name).map(|message| {
            message
                .field
                .iter()
                .map(|field| (field.name().to_string(), field.number()))
                .collect()
        })
    }

    /// Number of registered messages.
    pub fn len(&self) -> usize {
        self.inner.read().messages.len()
    }

    /// Whether no message is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fully-qualified names of every schema the management client binds.
pub fn management_type_names() -> [String; 6] {
    [
        Account::full_name(),
        User::full_name(),
        AddUserRequest::full_name(),
        AddUserResponse::full_name(),
        RemoveUserRequest::full_name(),
        RemoveUserResponse::full_name(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use prost_types::field_descriptor_proto::Type;

    #[test]
    fn test_ensure_registers_all_management_types() {
        let catalog = SchemaCatalog::new();
        assert!(catalog.is_empty());

        let added = catalog.ensure_management_schemas();
        assert_eq!(added, 6);
        for name in management_type_names() {
            assert!(catalog.contains(&name), "missing {name}");
        }
        assert!(catalog.file(descriptors::COMMAND_FILE).is_some());
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let catalog = SchemaCatalog::new();
        assert_eq!(catalog.ensure_management_schemas(), 6);
        assert_eq!(catalog.ensure_management_schemas(), 0);
        assert_eq!(catalog.ensure_management_schemas(), 0);
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn test_redefinition_is_a_no_op() {
        let catalog = SchemaCatalog::new();
        catalog.ensure_management_schemas();

        // A conflicting definition under an existing name must not replace it.
        let mut rogue = descriptors::vless_file();
        rogue.message_type[0].field.clear();
        assert_eq!(catalog.register_file(rogue), 0);

        let fields = catalog.field_numbers(&Account::full_name()).unwrap();
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_partial_catalog_only_fills_missing_files() {
        let catalog = SchemaCatalog::new();
        catalog.register_file(descriptors::vless_file());
        assert_eq!(catalog.ensure_management_schemas(), 5);
    }

    #[test]
    fn test_global_catalog_shared_across_callers() {
        let first = ensure_registered();
        let second = ensure_registered();
        assert!(std::ptr::eq(first, second));
        assert!(global().contains(&RemoveUserRequest::full_name()));
    }

    #[test]
    fn test_concurrent_registration() {
        let catalog = std::sync::Arc::new(SchemaCatalog::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = catalog.clone();
                std::thread::spawn(move || catalog.ensure_management_schemas())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 6);
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn test_require_missing_schema_is_configuration_error() {
        let catalog = SchemaCatalog::new();
        assert!(matches!(
            catalog.require("xray.proxy.vless.Account"),
            Err(ManagementError::Configuration(_))
        ));
    }

    #[test]
    fn test_descriptor_field_layout() {
        let catalog = SchemaCatalog::new();
        catalog.ensure_management_schemas();

        let user = catalog.message(&User::full_name()).unwrap();
        let account = user.field.iter().find(|f| f.name() == "account").unwrap();
        assert_eq!(account.number(), 4);
        assert_eq!(account.r#type(), Type::Message);
        assert_eq!(account.type_name(), ".google.protobuf.Any");

        assert_eq!(
            catalog.field_numbers(&AddUserRequest::full_name()).unwrap(),
            vec![("tag".to_string(), 1), ("user".to_string(), 2)]
        );
        assert!(
            catalog
                .field_numbers(&AddUserResponse::full_name())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_descriptor_numbers_match_static_encoding() {
        // Every field set to a non-default value must appear on the wire
        // under the number the descriptor declares.
        let catalog = SchemaCatalog::new();
        catalog.ensure_management_schemas();

        let account = Account {
            id: "a".into(),
            flow: "b".into(),
            encryption: "c".into(),
        };
        let wire_tags: Vec<u8> = account
            .encode_to_vec()
            .chunks(3)
            .map(|chunk| chunk[0] >> 3)
            .collect();
        let declared: Vec<u8> = catalog
            .field_numbers(&Account::full_name())
            .unwrap()
            .into_iter()
            .map(|(_, number)| number as u8)
            .collect();
        assert_eq!(wire_tags, declared);
    }
}
