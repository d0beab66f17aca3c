//! Fingerprint utilities for error deduplication

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// 64비트 fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// 메시지 + 상위 프레임으로 fingerprint 계산
    ///
    /// 프레임 순서가 다르면 다른 fingerprint가 된다.
    pub fn compute(kind: &str, message: &str, frames: &[String], depth: usize) -> Self {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        message.hash(&mut hasher);
        let top = &frames[..depth.min(frames.len())];
        hasher.write_usize(top.len());
        for frame in top {
            frame.hash(&mut hasher);
        }
        Self(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_deterministic() {
        let a = Fingerprint::compute("lifecycle", "boom", &frames(&["init"]), 3);
        let b = Fingerprint::compute("lifecycle", "boom", &frames(&["init"]), 3);
        assert_eq!(a, b);
        assert_eq!(a.to_string().len(), 16);
    }

    #[test]
    fn test_only_top_frames_count() {
        let a = Fingerprint::compute("hook", "x", &frames(&["a", "b", "c", "d"]), 2);
        let b = Fingerprint::compute("hook", "x", &frames(&["a", "b", "zzz"]), 2);
        assert_eq!(a, b);

        let c = Fingerprint::compute("hook", "x", &frames(&["b", "a"]), 2);
        assert_ne!(a, c);
    }

    #[test]
    fn test_kind_and_message_matter() {
        let base = Fingerprint::compute("hook", "x", &[], 3);
        assert_ne!(base, Fingerprint::compute("reload", "x", &[], 3));
        assert_ne!(base, Fingerprint::compute("hook", "y", &[], 3));
    }
}
