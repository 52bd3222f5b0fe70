//! # Entity 模块
//!
//! 包含所有 Sea-ORM 实体定义

pub mod provider_keys;
pub mod rotation_settings;
pub mod users;

pub use provider_keys::Entity as ProviderKeys;
pub use rotation_settings::Entity as RotationSettings;
pub use users::Entity as Users;
