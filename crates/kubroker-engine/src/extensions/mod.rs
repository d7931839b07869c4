//! Built-in service extensions.

mod default;
mod zookeeper;

pub use default::DefaultExtension;
pub use zookeeper::ZookeeperExtension;

use crate::extension::ExtensionRegistry;

/// Registry with every built-in extension.
pub fn builtin_registry() -> ExtensionRegistry {
    ExtensionRegistry::new().with(ZookeeperExtension::new())
}
