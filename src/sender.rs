//! 송신자 (클라이언트측)
//!
//! - 파일을 고정 크기 세그먼트로 분할해 PUT 패킷으로 전송
//! - ACK 받지 못한 세그먼트는 다음 라운드에 섞어서 재전송
//! - 완료 ACK의 체크섬을 로컬 CRC32C와 비교
//! - 데이터그램 바이트 수 기준 송신 속도 제한

use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use rand::seq::SliceRandom;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::crc32::crc32c;
use crate::packet::{FileId, Packet, SegmentNo};
use crate::{Config, Error, Result, MAX_DATAGRAM_SIZE, MAX_PAYLOAD_SIZE};

/// 데이터를 PUT 패킷들로 분할
///
/// 빈 데이터는 segment_total=0인 패킷 하나가 된다 (서버에서 즉시 완료 처리됨).
pub fn split_into_packets(
    file_id: FileId,
    data: &[u8],
    segment_size: usize,
) -> Result<Vec<Packet>> {
    if segment_size == 0 || segment_size > MAX_PAYLOAD_SIZE {
        return Err(Error::InvalidSegmentSize {
            size: segment_size,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    if data.is_empty() {
        return Ok(vec![Packet::put(file_id, 0, 0, Bytes::new())]);
    }

    let count = data.len().div_ceil(segment_size);
    let total = u32::try_from(count).map_err(|_| Error::TooManySegments { count })?;
    let data = Bytes::copy_from_slice(data);

    Ok((0..total)
        .map(|segment_no| {
            let start = segment_no as usize * segment_size;
            let end = (start + segment_size).min(data.len());
            Packet::put(file_id, segment_no, total, data.slice(start..end))
        })
        .collect())
}

/// 세그먼트별 ACK 추적
#[derive(Debug)]
struct AckTracker {
    file_id: FileId,
    total: usize,
    pending: BTreeSet<SegmentNo>,
    checksum: Option<u32>,
}

impl AckTracker {
    fn new(file_id: FileId, total: usize) -> Self {
        Self {
            file_id,
            total,
            pending: (0..total as SegmentNo).collect(),
            checksum: None,
        }
    }

    /// ACK 데이터그램 반영. 이 파일의 ACK가 아니면 false.
    fn apply(&mut self, datagram: &[u8]) -> bool {
        let ack = match Packet::from_bytes(datagram) {
            Ok(packet) if packet.is_ack() && packet.header.file_id == self.file_id => packet,
            Ok(_) => return false,
            Err(e) => {
                debug!("잘못된 ACK 무시: {}", e);
                return false;
            }
        };

        self.pending.remove(&ack.header.sequence_number);
        if let Some(checksum) = ack.checksum() {
            self.checksum = Some(checksum);
        }
        true
    }

    fn acked(&self) -> usize {
        self.total - self.pending.len()
    }

    fn is_done(&self) -> bool {
        self.pending.is_empty() && self.checksum.is_some()
    }
}

/// 파일 전송 결과
#[derive(Debug, Clone)]
pub struct SendReport {
    pub file_id: FileId,

    /// 파일 바이트 수
    pub bytes: usize,

    /// 세그먼트(패킷) 수
    pub segments: usize,

    /// 실제 전송한 데이터그램 수 (재전송 포함)
    pub datagrams_sent: u64,

    /// 사용한 라운드 수
    pub rounds: u32,

    /// 서버가 확인한 CRC32C
    pub checksum: u32,

    pub elapsed: Duration,
}

impl SendReport {
    /// 재전송 비율 (0.0 = 재전송 없음)
    pub fn retransmit_ratio(&self) -> f64 {
        if self.segments == 0 {
            return 0.0;
        }
        self.datagrams_sent.saturating_sub(self.segments as u64) as f64 / self.segments as f64
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / elapsed
    }
}

/// 바이트 단위 송신 속도 제한기
type ByteRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// 파일 송신자
pub struct FileSender {
    socket: UdpSocket,
    config: Config,
    rate_limiter: Option<ByteRateLimiter>,
}

impl FileSender {
    /// 소켓 바인딩 후 서버 주소로 connect
    pub async fn connect(
        bind_addr: SocketAddr,
        server_addr: SocketAddr,
        config: Config,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(server_addr).await?;
        info!("UDP PUT sender {} -> {}", socket.local_addr()?, server_addr);

        let rate_limiter = config.rate_limit().map(|limit| {
            info!("Speed limit: {} bytes/s", limit);
            RateLimiter::direct(Quota::per_second(limit))
        });

        Ok(Self {
            socket,
            config,
            rate_limiter,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 경로의 파일을 읽어 전송
    pub async fn send_path(&self, file_id: FileId, path: impl AsRef<Path>) -> Result<SendReport> {
        let data = tokio::fs::read(path).await?;
        self.send_file(file_id, &data).await
    }

    /// 파일 데이터 전송
    ///
    /// 모든 세그먼트가 ACK되고 서버 체크섬이 로컬 CRC32C와 같으면 성공.
    pub async fn send_file(&self, file_id: FileId, data: &[u8]) -> Result<SendReport> {
        let start = Instant::now();
        let datagrams: Vec<Bytes> = split_into_packets(file_id, data, self.config.segment_size)?
            .iter()
            .map(Packet::to_bytes)
            .collect();
        let expected = crc32c(data);

        let mut tracker = AckTracker::new(file_id, datagrams.len());
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut datagrams_sent = 0u64;
        let mut rounds = 0;

        while rounds < self.config.max_send_rounds && !tracker.is_done() {
            rounds += 1;

            // 전부 ACK됐는데 체크섬이 없으면 세그먼트 0을 다시 보내 체크섬 ACK를 받는다
            let mut order: Vec<SegmentNo> = if tracker.pending.is_empty() {
                vec![0]
            } else {
                tracker.pending.iter().copied().collect()
            };
            order.shuffle(&mut rand::thread_rng());

            for segment_no in order {
                let datagram = &datagrams[segment_no as usize];
                self.wait_for_quota(datagram.len()).await?;
                self.socket.send(datagram).await?;
                datagrams_sent += 1;
                self.drain_acks(&mut tracker, &mut buf)?;
            }

            self.collect_acks(&mut tracker, &mut buf).await?;

            debug!(
                "라운드 {}: file_id={}, {}/{} ACK",
                rounds,
                file_id,
                tracker.acked(),
                tracker.total
            );
        }

        let checksum = match tracker.checksum {
            Some(checksum) if tracker.pending.is_empty() => checksum,
            None if tracker.pending.is_empty() => return Err(Error::MissingChecksum { file_id }),
            _ => {
                return Err(Error::Incomplete {
                    file_id,
                    acked: tracker.acked(),
                    total: tracker.total,
                })
            }
        };

        if checksum != expected {
            return Err(Error::ChecksumMismatch {
                file_id,
                expected,
                got: checksum,
            });
        }

        let report = SendReport {
            file_id,
            bytes: data.len(),
            segments: tracker.total,
            datagrams_sent,
            rounds,
            checksum,
            elapsed: start.elapsed(),
        };

        info!(
            "파일 {} 전송 완료: {} bytes, {} 라운드, 재전송 {:.1}%",
            file_id,
            report.bytes,
            report.rounds,
            report.retransmit_ratio() * 100.0
        );

        Ok(report)
    }

    /// 데이터그램 길이만큼 송신 한도가 찰 때까지 대기
    async fn wait_for_quota(&self, len: usize) -> Result<()> {
        let Some(limiter) = &self.rate_limiter else {
            return Ok(());
        };
        let Some(cells) = u32::try_from(len).ok().and_then(NonZeroU32::new) else {
            return Ok(());
        };

        limiter
            .until_n_ready(cells)
            .await
            .map_err(|_| Error::RateLimited { len })
    }

    /// 이미 도착한 ACK를 기다리지 않고 처리
    fn drain_acks(&self, tracker: &mut AckTracker, buf: &mut [u8]) -> Result<()> {
        loop {
            match self.socket.try_recv(buf) {
                Ok(len) => {
                    tracker.apply(&buf[..len]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    debug!("서버 응답 없음 (connection refused)");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// ack_timeout 동안 ACK가 없을 때까지 수신
    async fn collect_acks(&self, tracker: &mut AckTracker, buf: &mut [u8]) -> Result<()> {
        let ack_timeout = self.config.ack_timeout();

        while !tracker.is_done() {
            match tokio::time::timeout(ack_timeout, self.socket.recv(buf)).await {
                Ok(Ok(len)) => {
                    tracker.apply(&buf[..len]);
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    warn!("서버 응답 없음 (connection refused)");
                    break;
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break, // 타임아웃
            }
        }

        Ok(())
    }
}
