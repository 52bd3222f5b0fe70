//! # 服务商密钥池模块
//!
//! 每个服务商一组轮换密钥，按用量单位计费，按预占再提交的方式记录用量。

pub mod db_store;
pub mod lease;
pub mod memory_store;
pub mod pool;
pub mod recorder;
pub mod registry;
pub mod rotation_settings;
pub mod rotation_window_task;
pub mod selector;
pub mod store;
pub mod types;

pub use db_store::DbKeyStore;
pub use lease::KeyLease;
pub use memory_store::MemoryKeyStore;
pub use pool::{KeyPool, ManagedPool};
pub use recorder::{
    CallOutcome, ProviderCallError, call_with_key, call_with_key_excluding, settle_lease,
};
pub use registry::{
    BearerTokenPool, CartesiaPool, FlowCookiePool, InworldPool, PoolRegistry, ZyphraPool,
};
pub use rotation_settings::{
    DbSettingsStore, MemorySettingsStore, RotationPreference, RotationSettings, SettingsStore,
};
pub use rotation_window_task::RotationWindowTask;
pub use selector::{MAX_RESERVE_ATTEMPTS, RotationSelector, rank_candidates};
pub use store::KeyStore;
pub use types::{
    AutoDisable, BulkAddItem, BulkAddOutcome, BulkAddReport, Characters, ExhaustionCause,
    KeyState, KeyView, Minutes, NewProviderKey, PoolPolicy, PoolStats, Provider, ProviderKey,
    Quantity, Requests, UnitKind, UsageUnit, fingerprint, mask_secret,
};
