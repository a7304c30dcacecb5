//! Probe results keyed by path and validated against the file's mtime.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lru::LruCache;
use parking_lot::Mutex;
use setbox_core::SourceDescriptor;

/// Bounded LRU cache of descriptors.
///
/// Entries are only ever replaced whole. A lookup with a different mtime than
/// the stored one is a miss.
pub struct DescriptorCache {
    entries: Mutex<LruCache<PathBuf, (SystemTime, SourceDescriptor)>>,
}

impl DescriptorCache {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The cached descriptor, if it was recorded for this exact mtime.
    pub fn get(&self, path: &Path, mtime: SystemTime) -> Option<SourceDescriptor> {
        let mut entries = self.entries.lock();
        match entries.get(path) {
            Some((stored, desc)) if *stored == mtime => Some(desc.clone()),
            _ => None,
        }
    }

    pub fn insert(&self, path: PathBuf, mtime: SystemTime, desc: SourceDescriptor) {
        self.entries.lock().put(path, (mtime, desc));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorCache")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn descriptor(codec: &str) -> SourceDescriptor {
        SourceDescriptor {
            supported: true,
            video_codec: codec.to_string(),
            ..SourceDescriptor::default()
        }
    }

    #[test]
    fn hit_requires_matching_mtime() {
        let cache = DescriptorCache::new(4);
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let t1 = t0 + Duration::from_secs(1);

        cache.insert(PathBuf::from("/a.mpg"), t0, descriptor("mpeg2video"));
        assert_eq!(
            cache.get(Path::new("/a.mpg"), t0).unwrap().video_codec,
            "mpeg2video"
        );
        assert!(cache.get(Path::new("/a.mpg"), t1).is_none());
        assert!(cache.get(Path::new("/b.mpg"), t0).is_none());
    }

    #[test]
    fn replaced_wholesale() {
        let cache = DescriptorCache::new(4);
        let t0 = SystemTime::UNIX_EPOCH;
        let t1 = t0 + Duration::from_secs(1);
        cache.insert(PathBuf::from("/a.mpg"), t0, descriptor("mpeg2video"));
        cache.insert(PathBuf::from("/a.mpg"), t1, descriptor("h264"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(Path::new("/a.mpg"), t0).is_none());
        assert_eq!(cache.get(Path::new("/a.mpg"), t1).unwrap().video_codec, "h264");
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = DescriptorCache::new(2);
        let t = SystemTime::UNIX_EPOCH;
        cache.insert(PathBuf::from("/a"), t, descriptor("a"));
        cache.insert(PathBuf::from("/b"), t, descriptor("b"));
        assert!(cache.get(Path::new("/a"), t).is_some());
        cache.insert(PathBuf::from("/c"), t, descriptor("c"));

        assert!(cache.get(Path::new("/a"), t).is_some());
        assert!(cache.get(Path::new("/b"), t).is_none());
        assert!(cache.get(Path::new("/c"), t).is_some());
    }

    #[test]
    fn zero_capacity_still_caches_one() {
        let cache = DescriptorCache::new(0);
        assert!(cache.is_empty());
        cache.insert(PathBuf::from("/a"), SystemTime::UNIX_EPOCH, descriptor("a"));
        assert_eq!(cache.len(), 1);
    }
}
