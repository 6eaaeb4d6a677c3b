//! 解析缓存，以原始过滤字符串为键。
//!
//! 宽松入口 [`ParseCache::get_or_parse`] 把“没有过滤条件”和“语法错误的过滤条件”
//! 同等对待，两者都返回 `Ok(None)`。语法正确但无法构建成树的文本
//! （未知运算符、值的个数不对）返回错误。需要严格校验的调用方
//! 通过 [`ParseCache::parser`] 获取所有错误。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::ast::FilterNode;
use crate::error::{FilterError, Result};
use crate::parser::FilterParser;

/// 缓存条目的存活时间和数量上限。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CachePolicy {
    /// 从不淘汰。
    Unbounded,
    /// 达到 `capacity` 后淘汰最近最少使用的条目。
    Lru { capacity: usize },
    /// 按 `capacity` 做 LRU，且每隔 `ttl` 清空整个缓存。
    Expiring {
        capacity: usize,
        #[serde(rename = "ttl_secs", with = "duration_secs")]
        ttl: Duration,
    },
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Expiring {
            capacity: 128,
            ttl: Duration::from_secs(20),
        }
    }
}

impl CachePolicy {
    fn capacity(&self) -> Option<usize> {
        match self {
            CachePolicy::Unbounded => None,
            CachePolicy::Lru { capacity } | CachePolicy::Expiring { capacity, .. } => Some(*capacity),
        }
    }

    fn ttl(&self) -> Option<Duration> {
        match self {
            CachePolicy::Expiring { ttl, .. } => Some(*ttl),
            _ => None,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(ttl.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct Entry {
    node: Arc<FilterNode>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    tick: u64,
    expires_at: Option<Instant>,
    stats: CacheStats,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.stats.evictions += 1;
            debug!(key = key.as_str(), "evicted least recently used filter");
        }
    }
}

#[derive(Debug)]
pub struct ParseCache {
    parser: FilterParser,
    policy: CachePolicy,
    state: Mutex<CacheState>,
}

impl ParseCache {
    pub fn new(parser: FilterParser, policy: CachePolicy) -> Self {
        let state = CacheState {
            expires_at: policy.ttl().and_then(|ttl| Instant::now().checked_add(ttl)),
            ..CacheState::default()
        };
        Self {
            parser,
            policy,
            state: Mutex::new(state),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// 不带缓存的解析器，供需要解析错误的调用方使用。
    pub fn parser(&self) -> &FilterParser {
        &self.parser
    }

    /// 返回 `text` 对应的 AST，每个存活条目最多解析一次。
    ///
    /// 空字符串和语法错误返回 `Ok(None)`。失败结果从不缓存，
    /// 之后的调用会重新解析。
    pub fn get_or_parse(&self, text: &str) -> Result<Option<Arc<FilterNode>>> {
        if text.is_empty() {
            return Ok(None);
        }

        let mut state = self.lock();
        self.expire(&mut state);

        let tick = state.next_tick();
        if let Some(entry) = state.entries.get_mut(text) {
            entry.last_used = tick;
            let node = Arc::clone(&entry.node);
            state.stats.hits += 1;
            trace!(filter = text, "parse cache hit");
            return Ok(Some(node));
        }
        state.stats.misses += 1;

        let node = match self.parser.parse(text) {
            Ok(node) => Arc::new(node),
            Err(e @ FilterError::Syntax { .. }) => {
                warn!(filter = text, error = %e, "ignoring unparseable filter");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match self.policy.capacity() {
            Some(0) => return Ok(Some(node)),
            Some(capacity) if state.entries.len() >= capacity => state.evict_lru(),
            _ => {}
        }

        debug!(filter = text, "caching parsed filter");
        state.entries.insert(
            text.to_string(),
            Entry {
                node: Arc::clone(&node),
                last_used: tick,
            },
        );
        Ok(Some(node))
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    fn expire(&self, state: &mut CacheState) {
        let (Some(ttl), Some(expires_at)) = (self.policy.ttl(), state.expires_at) else {
            return;
        };
        let now = Instant::now();
        if now >= expires_at {
            debug!(entries = state.entries.len(), "parse cache expired, clearing");
            state.stats.evictions += state.entries.len() as u64;
            state.entries.clear();
            state.expires_at = now.checked_add(ttl);
        }
    }

    // 持锁期间发生 panic 不会让 map 处于半写入状态，
    // 因此中毒的锁仍可继续使用。
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
