//! # 内存密钥存储
//!
//! 基于 `DashMap` 的实现，单个密钥的条件更新在分片写锁内完成。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::atomic::{AtomicI32, Ordering};

use super::store::KeyStore;
use super::types::{NewProviderKey, Provider, ProviderKey, mask_secret};
use crate::error::{KeyPoolError, Result};

pub struct MemoryKeyStore {
    keys: DashMap<i32, ProviderKey>,
    /// (provider, fingerprint) -> key id
    fingerprints: DashMap<(Provider, String), i32>,
    next_id: AtomicI32,
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            fingerprints: DashMap::new(),
            next_id: AtomicI32::new(1),
        }
    }

    /// 在指定密钥上执行修改，返回修改后的副本
    fn update<F>(&self, provider: Provider, key_id: i32, f: F) -> Option<ProviderKey>
    where
        F: FnOnce(&mut ProviderKey),
    {
        let mut entry = self.keys.get_mut(&key_id)?;
        if entry.provider != provider {
            return None;
        }
        f(entry.value_mut());
        Some(entry.value().clone())
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn list(&self, provider: Provider) -> Result<Vec<ProviderKey>> {
        let mut keys: Vec<ProviderKey> = self
            .keys
            .iter()
            .filter(|entry| entry.provider == provider)
            .map(|entry| entry.value().clone())
            .collect();
        keys.sort_by_key(|key| key.id);
        Ok(keys)
    }

    async fn get(&self, provider: Provider, key_id: i32) -> Result<Option<ProviderKey>> {
        Ok(self
            .keys
            .get(&key_id)
            .filter(|entry| entry.provider == provider)
            .map(|entry| entry.value().clone()))
    }

    async fn insert(&self, new_key: NewProviderKey) -> Result<ProviderKey> {
        let fingerprint = new_key.fingerprint();
        match self.fingerprints.entry((new_key.provider, fingerprint.clone())) {
            Entry::Occupied(_) => Err(KeyPoolError::DuplicateKey {
                provider: new_key.provider,
                masked_secret: mask_secret(&new_key.secret),
            }
            .into()),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let key = ProviderKey {
                    id,
                    provider: new_key.provider,
                    label: new_key.label,
                    secret: new_key.secret.trim().to_string(),
                    secret_fingerprint: fingerprint,
                    is_active: true,
                    units_used: 0,
                    units_limit: new_key.units_limit,
                    error_count: 0,
                    last_error: None,
                    last_used_at: None,
                    request_count: 0,
                    created_at: Utc::now(),
                };
                self.keys.insert(id, key.clone());
                slot.insert(id);
                Ok(key)
            }
        }
    }

    async fn try_reserve(
        &self,
        provider: Provider,
        key_id: i32,
        units: u64,
        enforce_limit: bool,
        error_threshold: Option<u32>,
    ) -> Result<bool> {
        let Some(mut entry) = self.keys.get_mut(&key_id) else {
            return Ok(false);
        };
        let key = entry.value_mut();
        if key.provider != provider || !key.is_active {
            return Ok(false);
        }
        if enforce_limit && key.remaining_units() < units {
            return Ok(false);
        }
        if error_threshold.is_some_and(|threshold| key.error_count >= threshold) {
            return Ok(false);
        }
        key.units_used = key.units_used.saturating_add(units);
        Ok(true)
    }

    async fn settle_failure(
        &self,
        provider: Provider,
        key_id: i32,
        units: u64,
        at: DateTime<Utc>,
        message: &str,
    ) -> Result<Option<ProviderKey>> {
        Ok(self.update(provider, key_id, |key| {
            key.units_used = key.units_used.saturating_sub(units);
            key.last_used_at = Some(at);
            key.request_count = key.request_count.saturating_add(1);
            key.error_count = key.error_count.saturating_add(1);
            key.last_error = Some(message.to_string());
        }))
    }

    async fn mark_used(&self, provider: Provider, key_id: i32, at: DateTime<Utc>) -> Result<()> {
        self.update(provider, key_id, |key| {
            key.last_used_at = Some(at);
            key.request_count = key.request_count.saturating_add(1);
        });
        Ok(())
    }

    async fn record_error(
        &self,
        provider: Provider,
        key_id: i32,
        message: &str,
    ) -> Result<Option<ProviderKey>> {
        Ok(self.update(provider, key_id, |key| {
            key.error_count = key.error_count.saturating_add(1);
            key.last_error = Some(message.to_string());
        }))
    }

    async fn set_active(
        &self,
        provider: Provider,
        key_id: i32,
        active: bool,
    ) -> Result<Option<ProviderKey>> {
        Ok(self.update(provider, key_id, |key| key.is_active = active))
    }

    async fn set_units_limit(
        &self,
        provider: Provider,
        key_id: i32,
        units_limit: u64,
    ) -> Result<Option<ProviderKey>> {
        Ok(self.update(provider, key_id, |key| key.units_limit = units_limit))
    }

    async fn reset_counters(
        &self,
        provider: Provider,
        key_id: i32,
    ) -> Result<Option<ProviderKey>> {
        Ok(self.update(provider, key_id, |key| {
            key.units_used = 0;
            key.error_count = 0;
            key.last_error = None;
        }))
    }

    async fn remove(&self, provider: Provider, key_id: i32) -> Result<bool> {
        match self
            .keys
            .remove_if(&key_id, |_, key| key.provider == provider)
        {
            Some((_, key)) => {
                self.fingerprints
                    .remove(&(key.provider, key.secret_fingerprint));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_all(&self, provider: Provider) -> Result<u64> {
        let ids: Vec<i32> = self
            .keys
            .iter()
            .filter(|entry| entry.provider == provider)
            .map(|entry| *entry.key())
            .collect();

        let mut removed = 0;
        for id in ids {
            if self.remove(provider, id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn reset_request_counts(&self, provider: Provider) -> Result<u64> {
        let mut affected = 0;
        for mut entry in self.keys.iter_mut() {
            if entry.provider == provider && entry.request_count > 0 {
                entry.request_count = 0;
                affected += 1;
            }
        }
        Ok(affected)
    }
}
