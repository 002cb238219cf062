//! 프로토콜 설정

use std::num::NonZeroU32;
use std::time::Duration;

use crate::{MAX_DATAGRAM_SIZE, MAX_PAYLOAD_SIZE};

/// UDP PUT 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 수신 버퍼 크기 (데이터그램 최대 크기)
    pub recv_buffer_size: usize,

    /// 동시에 추적하는 최대 파일 수 (0이면 무제한)
    /// 초과 시 가장 오래 활동이 없던 파일부터 제거
    pub max_tracked_files: usize,

    /// 미완료 파일 유휴 타임아웃 (밀리초, 0이면 무제한)
    pub idle_timeout_ms: u64,

    /// 완료된 파일 보존 시간 (밀리초, 0이면 영구 보존)
    /// 보존 중에는 중복 세그먼트에도 체크섬 ACK를 돌려줌
    pub completed_retention_ms: u64,

    /// 만료 정리 주기 (밀리초)
    pub eviction_interval_ms: u64,

    /// 송신 세그먼트 크기 (바이트)
    pub segment_size: usize,

    /// ACK 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// 최대 송신 라운드 수
    pub max_send_rounds: u32,

    /// 송신 속도 한도 (bytes/sec, 0이면 무제한)
    /// 데이터그램 최대 크기보다 작으면 데이터그램 최대 크기로 올림
    pub speed_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recv_buffer_size: MAX_DATAGRAM_SIZE,
            max_tracked_files: 1024,
            idle_timeout_ms: 60_000,           // 1분
            completed_retention_ms: 30_000,    // 30초
            eviction_interval_ms: 1_000,       // 1초
            segment_size: MAX_PAYLOAD_SIZE,
            ack_timeout_ms: 1_000,
            max_send_rounds: 16,
            speed_limit: 10 * 1024 * 1024,     // 10 MiB/s
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.idle_timeout_ms)
    }

    pub fn completed_retention(&self) -> Option<Duration> {
        non_zero_millis(self.completed_retention_ms)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms.max(1))
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// 송신 속도 한도. 데이터그램 하나는 항상 한 번에 보낼 수 있도록 최소값을 보정한다.
    pub fn rate_limit(&self) -> Option<NonZeroU32> {
        if self.speed_limit == 0 {
            return None;
        }
        NonZeroU32::new(self.speed_limit.max(MAX_DATAGRAM_SIZE as u32))
    }

    /// 프로세스 수명 동안 모든 파일을 유지 (제거 없음)
    pub fn unbounded() -> Self {
        Self {
            max_tracked_files: 0,
            idle_timeout_ms: 0,
            completed_retention_ms: 0,
            ..Self::default()
        }
    }

    /// 저사양 기기용 설정
    pub fn low_memory() -> Self {
        Self {
            max_tracked_files: 64,
            idle_timeout_ms: 15_000,
            completed_retention_ms: 5_000,
            eviction_interval_ms: 500,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            idle_timeout_ms: 300_000,          // 5분
            completed_retention_ms: 120_000,
            segment_size: 1000,                // 작은 세그먼트
            ack_timeout_ms: 2_000,
            max_send_rounds: 64,
            speed_limit: 2 * 1024 * 1024,
            ..Self::default()
        }
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_disables_timeouts() {
        let config = Config::unbounded();
        assert_eq!(config.max_tracked_files, 0);
        assert!(config.idle_timeout().is_none());
        assert!(config.completed_retention().is_none());

        let config = Config::default();
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.segment_size + crate::PacketHeader::SIZE, MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn test_rate_limit_floor() {
        let config = Config {
            speed_limit: 0,
            ..Config::default()
        };
        assert!(config.rate_limit().is_none());

        let config = Config {
            speed_limit: 100,
            ..Config::default()
        };
        assert_eq!(
            config.rate_limit().map(NonZeroU32::get),
            Some(MAX_DATAGRAM_SIZE as u32)
        );

        let config = Config::default();
        assert_eq!(config.rate_limit().map(NonZeroU32::get), Some(10 * 1024 * 1024));
    }

    #[test]
    fn test_eviction_interval_never_zero() {
        let config = Config {
            eviction_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(config.eviction_interval(), Duration::from_millis(1));
    }
}
