pub mod item;
pub mod user;

pub use item::Item;
pub use user::{User, UserPublic};

use rls_core::RlsRegistry;

/// Register every owned entity type with the registry.
///
/// New isolated entities must be added here; the compliance test
/// cross-checks this list against the migration SQL so a table carrying an
/// `owner_id` column can never ship unregistered.
pub fn register_owned_entities(registry: &RlsRegistry) {
    registry.register::<Item>();
}
