use once_cell::sync::Lazy;
use uuid::Uuid;

/// The komet namespace UUID. Well-known components and scenario names are turned into stable
/// UUIDs by hashing them into this namespace with [Uuid::new_v5].
pub const UUID_NAMESPACE_KOMET: Uuid = Uuid::from_bytes([
    0x1f, 0x8e, 0x4a, 0x02, 0x93, 0x5d, 0x4c, 0x61, 0xb7, 0x0c, 0x2e, 0x95, 0x11, 0xd4, 0x6a, 0x3b,
]);

/// Deterministic UUID for `name` within [UUID_NAMESPACE_KOMET].
pub fn name_uuid(name: &str) -> Uuid {
    Uuid::new_v5(&UUID_NAMESPACE_KOMET, name.as_bytes())
}

pub static MASTER_PATH: Lazy<Uuid> = Lazy::new(|| name_uuid("master path"));
pub static DEVELOPMENT_PATH: Lazy<Uuid> = Lazy::new(|| name_uuid("development path"));
pub static USER: Lazy<Uuid> = Lazy::new(|| name_uuid("user"));
pub static CORE_MODULE: Lazy<Uuid> = Lazy::new(|| name_uuid("core module"));
pub static CONCEPT_ASSEMBLAGE: Lazy<Uuid> = Lazy::new(|| name_uuid("concept assemblage"));
pub static DESCRIPTION_ASSEMBLAGE: Lazy<Uuid> = Lazy::new(|| name_uuid("description assemblage"));

/// Every well-known component with the name it is hashed from, in bootstrap order.
pub fn all() -> [(&'static str, Uuid); 6] {
    [
        ("master path", *MASTER_PATH),
        ("development path", *DEVELOPMENT_PATH),
        ("user", *USER),
        ("core module", *CORE_MODULE),
        ("concept assemblage", *CONCEPT_ASSEMBLAGE),
        ("description assemblage", *DESCRIPTION_ASSEMBLAGE),
    ]
}
