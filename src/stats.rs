//! 서버 통계

use std::time::{Duration, Instant};

/// 수신 서버 통계
#[derive(Debug, Clone)]
pub struct ServerStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 수신 데이터그램 수
    pub datagrams_received: u64,

    /// 수신 바이트 (헤더 포함)
    pub bytes_received: u64,

    /// 파싱 실패로 버린 데이터그램 수
    pub malformed_datagrams: u64,

    /// 파일 ID 불일치/범위 초과로 거부된 세그먼트 수
    pub rejected_segments: u64,

    /// 전송한 ACK 수
    pub acks_sent: u64,

    /// 전송 실패한 ACK 수
    pub ack_send_failures: u64,

    /// 새로 추적을 시작한 파일 수
    pub files_started: u64,

    /// 완료된 파일 수
    pub files_completed: u64,

    /// 제거된 파일 수 (만료 + 용량 초과)
    pub files_evicted: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            datagrams_received: 0,
            bytes_received: 0,
            malformed_datagrams: 0,
            rejected_segments: 0,
            acks_sent: 0,
            ack_send_failures: 0,
            files_started: 0,
            files_completed: 0,
            files_evicted: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 수신 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_received as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Datagrams: {} ({} malformed, {} rejected) | Bytes: {} | Throughput: {:.2} MB/s | ACKs: {} ({} failed) | Files: {}/{} completed, {} evicted",
            self.elapsed().as_secs_f64(),
            self.datagrams_received,
            self.malformed_datagrams,
            self.rejected_segments,
            self.bytes_received,
            self.throughput() / 1_000_000.0,
            self.acks_sent,
            self.ack_send_failures,
            self.files_completed,
            self.files_started,
            self.files_evicted,
        )
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}
