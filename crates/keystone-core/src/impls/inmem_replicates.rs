//! InMemoryReplicates - ワーカーの replicate をメモリに持つ実装
//!
//! テストやデモではワーカーの報告を `report` で直接書き込む。

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{ChainTaskId, KeystoneError, Replicate, ReplicateStatus, Result, WalletAddress};
use crate::ports::ReplicateQuery;

#[derive(Default)]
pub struct InMemoryReplicates {
    replicates: Mutex<HashMap<ChainTaskId, Vec<Replicate>>>,
    unavailable: Mutex<bool>,
}

impl InMemoryReplicates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status reported by `wallet` for `chain_task_id`, creating the
    /// replicate on first report.
    pub fn report(&self, chain_task_id: &ChainTaskId, wallet: &WalletAddress, status: ReplicateStatus) {
        let mut all = self.lock();
        let replicates = all.entry(chain_task_id.clone()).or_default();
        match replicates.iter_mut().find(|r| &r.wallet_address == wallet) {
            Some(replicate) => replicate.update_status(status),
            None => {
                let mut replicate = Replicate::new(wallet.clone(), chain_task_id.clone());
                replicate.update_status(status);
                replicates.push(replicate);
            }
        }
    }

    /// Record an upload with its result link.
    pub fn report_uploaded(&self, chain_task_id: &ChainTaskId, wallet: &WalletAddress, link: &str) {
        self.report(chain_task_id, wallet, ReplicateStatus::ResultUploaded);
        let mut all = self.lock();
        if let Some(replicate) = all
            .get_mut(chain_task_id)
            .and_then(|rs| rs.iter_mut().find(|r| &r.wallet_address == wallet))
        {
            replicate.result_link = Some(link.to_string());
        }
    }

    /// Make every query fail (for error-path tests).
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap_or_else(PoisonError::into_inner) = unavailable;
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChainTaskId, Vec<Replicate>>> {
        self.replicates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<()> {
        if *self.unavailable.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(KeystoneError::Replicates("replicate store unavailable".to_string()));
        }
        Ok(())
    }

    fn with_task<T>(&self, chain_task_id: &ChainTaskId, f: impl FnOnce(&[Replicate]) -> T) -> Result<T> {
        self.check()?;
        let all = self.lock();
        let replicates = all.get(chain_task_id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(f(replicates))
    }
}

#[async_trait]
impl ReplicateQuery for InMemoryReplicates {
    async fn count_with_status(
        &self,
        chain_task_id: &ChainTaskId,
        statuses: &[ReplicateStatus],
    ) -> Result<u32> {
        self.with_task(chain_task_id, |rs| {
            rs.iter()
                .filter(|r| statuses.contains(&r.current_status()))
                .count() as u32
        })
    }

    async fn count_containing(
        &self,
        chain_task_id: &ChainTaskId,
        status: ReplicateStatus,
    ) -> Result<u32> {
        self.with_task(chain_task_id, |rs| {
            rs.iter().filter(|r| r.contains_status(status)).count() as u32
        })
    }

    async fn sample_with_reveal_status(
        &self,
        chain_task_id: &ChainTaskId,
    ) -> Result<Option<Replicate>> {
        self.with_task(chain_task_id, |rs| {
            let revealed: Vec<&Replicate> = rs
                .iter()
                .filter(|r| r.current_status() == ReplicateStatus::Revealed)
                .collect();
            revealed.choose(&mut rand::thread_rng()).map(|r| (*r).clone())
        })
    }

    async fn get_with_result_uploaded_status(
        &self,
        chain_task_id: &ChainTaskId,
    ) -> Result<Option<Replicate>> {
        self.with_task(chain_task_id, |rs| {
            rs.iter()
                .find(|r| r.current_status() == ReplicateStatus::ResultUploaded)
                .cloned()
        })
    }

    async fn find_replicate(
        &self,
        chain_task_id: &ChainTaskId,
        wallet: &WalletAddress,
    ) -> Result<Option<Replicate>> {
        self.with_task(chain_task_id, |rs| {
            rs.iter().find(|r| &r.wallet_address == wallet).cloned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn chain_id() -> ChainTaskId {
        ChainTaskId::new("0xc1")
    }

    #[tokio::test]
    async fn counts_current_and_historical_statuses() {
        let replicates = InMemoryReplicates::new();
        let (w1, w2) = (WalletAddress::new("0xw1"), WalletAddress::new("0xw2"));
        replicates.report(&chain_id(), &w1, ReplicateStatus::Contributed);
        replicates.report(&chain_id(), &w1, ReplicateStatus::Revealed);
        replicates.report(&chain_id(), &w2, ReplicateStatus::Contributed);

        let contributed_now = replicates
            .count_with_status(&chain_id(), &[ReplicateStatus::Contributed])
            .await
            .unwrap();
        let ever_contributed = replicates
            .count_containing(&chain_id(), ReplicateStatus::Contributed)
            .await
            .unwrap();
        assert_eq!(contributed_now, 1);
        assert_eq!(ever_contributed, 2);
    }

    #[tokio::test]
    async fn sampling_only_picks_revealed_and_reaches_all_of_them() {
        let replicates = InMemoryReplicates::new();
        for wallet in ["0xw1", "0xw2", "0xw3"] {
            replicates.report(&chain_id(), &WalletAddress::new(wallet), ReplicateStatus::Revealed);
        }
        replicates.report(&chain_id(), &WalletAddress::new("0xw4"), ReplicateStatus::Computed);

        let mut seen = HashSet::new();
        for _ in 0..200 {
            let sample = replicates
                .sample_with_reveal_status(&chain_id())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(sample.current_status(), ReplicateStatus::Revealed);
            seen.insert(sample.wallet_address);
        }
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn uploaded_replicate_carries_link() {
        let replicates = InMemoryReplicates::new();
        let w1 = WalletAddress::new("0xw1");
        replicates.report(&chain_id(), &w1, ReplicateStatus::Revealed);
        replicates.report_uploaded(&chain_id(), &w1, "https://results/0xc1");

        let uploaded = replicates
            .get_with_result_uploaded_status(&chain_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(uploaded.result_link.as_deref(), Some("https://results/0xc1"));
    }

    #[tokio::test]
    async fn unavailable_store_errors() {
        let replicates = InMemoryReplicates::new();
        replicates.set_unavailable(true);
        assert!(replicates.count_containing(&chain_id(), ReplicateStatus::Revealed).await.is_err());
    }
}
