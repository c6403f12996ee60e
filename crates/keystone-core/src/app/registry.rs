//! ExpiringRegistry - TTL 付きのマップ
//!
//! # 実装詳細
//! - HashMap<K, Slot<V>> が正本
//! - 期限は BinaryHeap（最小ヒープ）で管理し、古い期限は遅延で捨てる
//!   （renew のたびに世代番号を進め、ヒープ側の世代と一致しないものは無視）
//! - ロックは持たない。呼び出し側（UpdateScheduler）が Mutex で包む

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

struct Slot<V> {
    value: V,
    expires_at: Instant,
    generation: u64,
}

struct Deadline<K> {
    at: Instant,
    generation: u64,
    key: K,
}

impl<K> PartialEq for Deadline<K> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.generation == other.generation
    }
}

impl<K> Eq for Deadline<K> {}

impl<K> PartialOrd for Deadline<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Deadline<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering: earlier deadlines have higher priority
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

pub struct ExpiringRegistry<K, V> {
    entries: HashMap<K, Slot<V>>,
    deadlines: BinaryHeap<Deadline<K>>,
    ttl: Duration,
    next_generation: u64,
}

impl<K: Eq + Hash + Clone, V> ExpiringRegistry<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            deadlines: BinaryHeap::new(),
            ttl,
            next_generation: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn expires_at(&self, key: &K) -> Option<Instant> {
        self.entries.get(key).map(|slot| slot.expires_at)
    }

    /// `key` の値を返す。なければ `make` で作る。どちらでも TTL は `now` から数え直す
    pub fn get_or_insert_with(&mut self, key: K, now: Instant, make: impl FnOnce() -> V) -> &V {
        let generation = self.bump();
        let expires_at = now + self.ttl;
        self.push_deadline(key.clone(), expires_at, generation);

        let slot = self.entries.entry(key).or_insert_with(|| Slot {
            value: make(),
            expires_at,
            generation,
        });
        slot.expires_at = expires_at;
        slot.generation = generation;
        &slot.value
    }

    /// `key` の TTL を数え直す。なければ false
    pub fn renew(&mut self, key: &K, now: Instant) -> bool {
        if !self.entries.contains_key(key) {
            return false;
        }
        let generation = self.bump();
        let expires_at = now + self.ttl;
        if let Some(slot) = self.entries.get_mut(key) {
            slot.expires_at = expires_at;
            slot.generation = generation;
        }
        self.push_deadline(key.clone(), expires_at, generation);
        true
    }

    /// TTL に関係なく `key` をすぐに外す
    pub fn force_expire(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|slot| slot.value)
    }

    /// `now` までに TTL が切れたエントリを外す
    ///
    /// `keep` が true を返すエントリは外さず、TTL をもう 1 回分延長する。
    pub fn sweep(&mut self, now: Instant, keep: impl Fn(&V) -> bool) -> Vec<(K, V)> {
        let mut expired = Vec::new();
        let mut rearm = Vec::new();

        while self.deadlines.peek().is_some_and(|d| d.at <= now) {
            let Some(deadline) = self.deadlines.pop() else {
                break;
            };
            let live = self
                .entries
                .get(&deadline.key)
                .is_some_and(|slot| slot.generation == deadline.generation);
            if !live {
                continue;
            }
            let keep_it = self
                .entries
                .get(&deadline.key)
                .is_some_and(|slot| keep(&slot.value));
            if keep_it {
                rearm.push(deadline.key);
            } else if let Some(slot) = self.entries.remove(&deadline.key) {
                expired.push((deadline.key, slot.value));
            }
        }

        for key in rearm {
            self.renew(&key, now);
        }
        self.compact();
        expired
    }

    /// 全部外す
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.deadlines.clear();
        self.entries
            .drain()
            .map(|(key, slot)| (key, slot.value))
            .collect()
    }

    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn push_deadline(&mut self, key: K, at: Instant, generation: u64) {
        self.deadlines.push(Deadline {
            at,
            generation,
            key,
        });
    }

    /// 古いヒープ要素が生きている要素より明らかに多くなったら捨てる
    fn compact(&mut self) {
        if self.deadlines.len() <= 2 * self.entries.len() + 64 {
            return;
        }
        self.deadlines = self
            .entries
            .iter()
            .map(|(key, slot)| Deadline {
                at: slot.expires_at,
                generation: slot.generation,
                key: key.clone(),
            })
            .collect();
    }

    #[cfg(test)]
    fn heap_len(&self) -> usize {
        self.deadlines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let mut registry = ExpiringRegistry::new(TTL);
        let start = Instant::now();
        registry.get_or_insert_with("a", start, || 1);

        assert!(registry.sweep(start + Duration::from_secs(9), |_| false).is_empty());
        let expired = registry.sweep(start + TTL, |_| false);
        assert_eq!(expired, vec![("a", 1)]);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn access_renews_ttl() {
        let mut registry = ExpiringRegistry::new(TTL);
        let start = Instant::now();
        registry.get_or_insert_with("a", start, || 1);

        let later = start + Duration::from_secs(8);
        assert_eq!(*registry.get_or_insert_with("a", later, || 2), 1);

        assert!(registry.sweep(start + TTL, |_| false).is_empty());
        assert_eq!(registry.expires_at(&"a"), Some(later + TTL));
        assert_eq!(registry.sweep(later + TTL, |_| false).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn kept_entries_are_rearmed() {
        let mut registry = ExpiringRegistry::new(TTL);
        let start = Instant::now();
        registry.get_or_insert_with("busy", start, || true);
        registry.get_or_insert_with("idle", start, || false);

        let expired = registry.sweep(start + TTL, |busy| *busy);
        assert_eq!(expired, vec![("idle", false)]);
        assert!(registry.contains_key(&"busy"));
        assert_eq!(registry.expires_at(&"busy"), Some(start + TTL + TTL));
    }

    #[tokio::test(start_paused = true)]
    async fn force_expire_removes_immediately() {
        let mut registry = ExpiringRegistry::new(TTL);
        let start = Instant::now();
        registry.get_or_insert_with("a", start, || 1);

        assert_eq!(registry.force_expire(&"a"), Some(1));
        assert!(!registry.contains_key(&"a"));
        // the stale deadline is ignored
        assert!(registry.sweep(start + TTL, |_| false).is_empty());
        assert!(!registry.renew(&"a", start));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_deadlines_are_compacted() {
        let mut registry = ExpiringRegistry::new(TTL);
        let start = Instant::now();
        for i in 0..500u64 {
            registry.get_or_insert_with("a", start + Duration::from_millis(i), || 0);
        }
        assert_eq!(registry.heap_len(), 500);

        registry.sweep(start, |_| false);
        assert!(registry.heap_len() <= 66);
        assert_eq!(registry.len(), 1);
    }
}
