//! 파일 레지스트리
//!
//! - file_id → 재조립 중인 파일
//! - file_id → 체크섬 캐시 (파일이 처음 완성되는 순간 한 번만 채워짐)
//! - 만료/용량 정책에 따른 제거 (파일과 캐시 항목을 함께 제거)

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::file::File;
use crate::packet::{FileId, Packet};
use crate::Config;

/// 추적 중인 파일 상태
#[derive(Debug)]
struct TrackedFile {
    file: File,
    last_activity: Instant,
    completed_at: Option<Instant>,
}

/// 세그먼트 삽입 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// 세그먼트가 파일에 들어갔는지 (file_id 불일치/범위 초과면 false)
    pub accepted: bool,

    /// 이 패킷으로 새 파일 추적이 시작되었는지
    pub new_file: bool,

    /// 삽입 후 파일의 세그먼트 수
    pub size: u32,

    /// 파일이 완성된 경우 체크섬
    pub checksum: Option<u32>,

    /// 이 삽입으로 처음 완성되었는지
    pub newly_completed: bool,

    /// 새 파일 자리를 만들려고 제거한 파일
    pub evicted: Option<FileId>,
}

/// 파일 레지스트리 + 체크섬 캐시
#[derive(Debug)]
pub struct Registry {
    files: HashMap<FileId, TrackedFile>,
    checksums: HashMap<FileId, u32>,
    max_files: usize,
    idle_timeout: Option<Duration>,
    completed_retention: Option<Duration>,
}

impl Registry {
    pub fn new(config: &Config) -> Self {
        Self {
            files: HashMap::new(),
            checksums: HashMap::new(),
            max_files: config.max_tracked_files,
            idle_timeout: config.idle_timeout(),
            completed_retention: config.completed_retention(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, file_id: FileId) -> bool {
        self.files.contains_key(&file_id)
    }

    pub fn get(&self, file_id: FileId) -> Option<&File> {
        self.files.get(&file_id).map(|tracked| &tracked.file)
    }

    /// 캐시된 체크섬 (완성된 파일만)
    pub fn checksum(&self, file_id: FileId) -> Option<u32> {
        self.checksums.get(&file_id).copied()
    }

    /// 패킷을 해당 파일에 삽입
    ///
    /// 처음 보는 file_id면 이 패킷의 segment_total을 용량으로 파일을 만든다.
    /// 이후 패킷의 segment_total은 무시한다.
    pub fn insert(&mut self, packet: Packet, now: Instant) -> Insertion {
        let header = packet.header;
        let file_id = header.file_id;

        let new_file = !self.files.contains_key(&file_id);
        let evicted = if new_file { self.make_room() } else { None };

        let tracked = self.files.entry(file_id).or_insert_with(|| TrackedFile {
            file: File::new(file_id, header.segment_total),
            last_activity: now,
            completed_at: None,
        });
        tracked.last_activity = now;

        let accepted = tracked.file.add_packet(packet);

        let mut newly_completed = false;
        let checksum = if let Some(&checksum) = self.checksums.get(&file_id) {
            Some(checksum)
        } else if tracked.file.is_full() {
            let checksum = tracked.file.checksum();
            if let Some(checksum) = checksum {
                self.checksums.insert(file_id, checksum);
                tracked.completed_at = Some(now);
                newly_completed = true;
            }
            checksum
        } else {
            None
        };

        Insertion {
            accepted,
            new_file,
            size: tracked.file.size(),
            checksum,
            newly_completed,
            evicted,
        }
    }

    /// 파일과 체크섬 캐시 항목 제거
    pub fn remove(&mut self, file_id: FileId) -> Option<File> {
        self.checksums.remove(&file_id);
        self.files.remove(&file_id).map(|tracked| tracked.file)
    }

    /// 만료된 파일 제거
    ///
    /// - 완료된 파일: 완료 후 보존 시간이 지나면 제거
    /// - 미완료 파일: 마지막 세그먼트 이후 유휴 타임아웃이 지나면 제거
    pub fn evict_expired(&mut self, now: Instant) -> Vec<FileId> {
        let idle_timeout = self.idle_timeout;
        let retention = self.completed_retention;

        let expired: Vec<FileId> = self
            .files
            .iter()
            .filter(|(_, tracked)| match tracked.completed_at {
                Some(completed_at) => retention
                    .is_some_and(|limit| now.saturating_duration_since(completed_at) >= limit),
                None => idle_timeout.is_some_and(|limit| {
                    now.saturating_duration_since(tracked.last_activity) >= limit
                }),
            })
            .map(|(&file_id, _)| file_id)
            .collect();

        for &file_id in &expired {
            self.remove(file_id);
        }

        expired
    }

    /// 최대 파일 수에 도달했으면 가장 오래 활동이 없던 파일 제거
    fn make_room(&mut self) -> Option<FileId> {
        if self.max_files == 0 || self.files.len() < self.max_files {
            return None;
        }

        let oldest = self
            .files
            .iter()
            .min_by_key(|(_, tracked)| tracked.last_activity)
            .map(|(&file_id, _)| file_id)?;

        self.remove(oldest);
        Some(oldest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc32::crc32c;
    use bytes::Bytes;

    fn put(file_id: FileId, seq: u32, total: u32, payload: &[u8]) -> Packet {
        Packet::put(file_id, seq, total, Bytes::copy_from_slice(payload))
    }

    #[test]
    fn test_first_packet_sets_capacity() {
        let mut registry = Registry::new(&Config::unbounded());
        let now = Instant::now();

        let insertion = registry.insert(put(1, 0, 2, b"a"), now);
        assert!(insertion.new_file);
        assert!(insertion.accepted);

        // 이후 패킷의 segment_total은 무시
        let insertion = registry.insert(put(1, 2, 5, b"c"), now);
        assert!(!insertion.new_file);
        assert!(!insertion.accepted);
        assert_eq!(insertion.size, 1);
        assert_eq!(registry.get(1).unwrap().capacity(), 2);
    }

    #[test]
    fn test_checksum_cached_once() {
        let mut registry = Registry::new(&Config::unbounded());
        let now = Instant::now();

        let first = registry.insert(put(7, 0, 2, &[0xAA]), now);
        assert_eq!(first.checksum, None);
        assert!(!first.newly_completed);

        let second = registry.insert(put(7, 1, 2, &[0xBB]), now);
        assert!(second.newly_completed);
        assert_eq!(second.checksum, Some(crc32c(&[0xAA, 0xBB])));
        assert_eq!(registry.checksum(7), second.checksum);

        let repeat = registry.insert(put(7, 1, 2, &[0xBB]), now);
        assert!(!repeat.newly_completed);
        assert_eq!(repeat.checksum, second.checksum);
        assert_eq!(repeat.size, 2);
    }

    #[test]
    fn test_zero_capacity_completes_immediately() {
        let mut registry = Registry::new(&Config::unbounded());

        let insertion = registry.insert(put(3, 0, 0, b""), Instant::now());
        assert!(!insertion.accepted);
        assert!(insertion.newly_completed);
        assert_eq!(insertion.checksum, Some(0));
        assert_eq!(insertion.size, 0);
    }

    #[test]
    fn test_idle_and_completed_expiry() {
        let config = Config {
            idle_timeout_ms: 1_000,
            completed_retention_ms: 5_000,
            ..Config::unbounded()
        };
        let mut registry = Registry::new(&config);
        let start = Instant::now();

        registry.insert(put(1, 0, 2, b"a"), start);
        registry.insert(put(2, 0, 1, b"b"), start);
        assert_eq!(registry.len(), 2);

        assert!(registry.evict_expired(start + Duration::from_millis(500)).is_empty());

        // 미완료 파일 1만 유휴 타임아웃
        let evicted = registry.evict_expired(start + Duration::from_secs(2));
        assert_eq!(evicted, vec![1]);
        assert!(registry.contains(2));
        assert_eq!(registry.checksum(2), Some(crc32c(b"b")));

        let evicted = registry.evict_expired(start + Duration::from_secs(6));
        assert_eq!(evicted, vec![2]);
        assert!(registry.is_empty());
        assert_eq!(registry.checksum(2), None);
    }

    #[test]
    fn test_activity_postpones_idle_expiry() {
        let config = Config {
            idle_timeout_ms: 1_000,
            ..Config::unbounded()
        };
        let mut registry = Registry::new(&config);
        let start = Instant::now();

        registry.insert(put(1, 0, 3, b"a"), start);
        registry.insert(put(1, 1, 3, b"b"), start + Duration::from_millis(900));

        assert!(registry
            .evict_expired(start + Duration::from_millis(1_500))
            .is_empty());
        assert_eq!(
            registry.evict_expired(start + Duration::from_millis(1_900)),
            vec![1]
        );
    }

    #[test]
    fn test_capacity_evicts_least_recently_active() {
        let config = Config {
            max_tracked_files: 2,
            ..Config::unbounded()
        };
        let mut registry = Registry::new(&config);
        let start = Instant::now();

        registry.insert(put(1, 0, 2, b"a"), start);
        registry.insert(put(2, 0, 2, b"b"), start + Duration::from_millis(1));
        registry.insert(put(1, 1, 2, b"c"), start + Duration::from_millis(2));

        let insertion = registry.insert(put(3, 0, 2, b"d"), start + Duration::from_millis(3));
        assert_eq!(insertion.evicted, Some(2));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(1));
        assert!(registry.contains(3));
    }

    #[test]
    fn test_unbounded_never_evicts() {
        let mut registry = Registry::new(&Config::unbounded());
        let start = Instant::now();

        for file_id in 0..100 {
            registry.insert(put(file_id, 0, 2, b"x"), start);
        }

        assert!(registry
            .evict_expired(start + Duration::from_secs(86_400))
            .is_empty());
        assert_eq!(registry.len(), 100);
    }
}
