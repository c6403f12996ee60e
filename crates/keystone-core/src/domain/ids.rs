//! Domain identifiers (strongly-typed IDs).
//!
//! Two families live here:
//!
//! - `Id<T>`: ULID ベースの ID。オーケストレータ自身が払い出す（`TaskId`）。
//!   時刻でソート可能で、分散環境でも調整なしで生成できる。
//! - `ChainRef<T>`: チェーン側で決まる 0x 付き hex 文字列の参照
//!   （`ChainTaskId`, `ChainDealId`, `WalletAddress`）。
//!
//! どちらも Phantom type パターンでマーカー型を持たせ、
//! `ChainTaskId` と `ChainDealId` のような同じ表現の値を混同できないようにしている。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"task-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ULID-backed identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Reference to something whose identity is decided on chain.
///
/// The value is stored lower-cased so that `0xABC` and `0xabc` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainRef<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> ChainRef<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into().to_ascii_lowercase(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> From<&str> for ChainRef<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for ChainRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChainTask {}

impl IdMarker for ChainTask {
    fn prefix() -> &'static str {
        ""
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChainDeal {}

impl IdMarker for ChainDeal {
    fn prefix() -> &'static str {
        ""
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Wallet {}

impl IdMarker for Wallet {
    fn prefix() -> &'static str {
        ""
    }
}

/// Identifier of a task record (store key, scheduler key).
pub type TaskId = Id<Task>;

/// Identifier assigned by the chain once the task is initialized.
pub type ChainTaskId = ChainRef<ChainTask>;

/// Identifier of the deal a task belongs to.
pub type ChainDealId = ChainRef<ChainDeal>;

/// Wallet address of a worker.
pub type WalletAddress = ChainRef<Wallet>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_display_has_prefix() {
        let ulid = Ulid::new();
        let id = TaskId::from_ulid(ulid);
        assert_eq!(id.as_ulid(), ulid);
        assert!(id.to_string().starts_with("task-"));
    }

    #[test]
    fn chain_refs_are_case_insensitive() {
        let a = ChainTaskId::new("0xABCDEF");
        let b = ChainTaskId::from("0xabcdef");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0xabcdef");
    }

    #[test]
    fn chain_refs_serialize_as_plain_strings() {
        let wallet = WalletAddress::new("0x1a69b2eb604db8eba185df03ea4f5288dcbbd248");
        let json = serde_json::to_string(&wallet).unwrap();
        assert_eq!(json, "\"0x1a69b2eb604db8eba185df03ea4f5288dcbbd248\"");

        let back: WalletAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wallet);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<ChainTaskId>(), size_of::<String>());
    }
}
