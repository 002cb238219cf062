//! 수신 서버
//!
//! - 데이터그램 수신 → 파싱 → 파일 재조립 → (완성 시) 알림 → ACK 전송
//! - 단일 루프에서 데이터그램 하나를 끝까지 처리한 뒤 다음을 받음 (레지스트리에 락 불필요)
//! - 파싱 실패한 데이터그램은 버리고 계속 진행
//! - ACK 전송 실패는 재시도하지 않음

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::file::File;
use crate::packet::{FileId, Packet};
use crate::registry::Registry;
use crate::stats::ServerStats;
use crate::store;
use crate::{Config, Result};

/// 파일 완성 알림 핸들러 (file, checksum)
pub type CompletionHandler = Box<dyn FnMut(&File, u32) + Send>;

/// 데이터그램 전송 계층
///
/// 수신 길이 0은 전송 계층 종료를 뜻한다.
pub trait Transport: Send + Sync {
    /// 데이터그램 하나를 받아 (길이, 송신자 주소)를 반환
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    /// 데이터그램 하나를 전송
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;
}

impl Transport for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            let (len, peer) = UdpSocket::recv_from(self, buf).await?;
            // UDP에서 빈 데이터그램은 종료 신호가 아니라 단순히 헤더가 없는 패킷
            if len > 0 {
                return Ok((len, peer));
            }
            trace!("빈 데이터그램 무시: {}", peer);
        }
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }
}

/// 루프 한 번의 이벤트
enum Event {
    Datagram(io::Result<(usize, SocketAddr)>),
    Evict,
}

/// 수신 서버
pub struct Server<T: Transport = UdpSocket> {
    transport: T,
    config: Config,
    registry: Registry,
    on_file_complete: Option<CompletionHandler>,
    stats: Arc<RwLock<ServerStats>>,
}

impl Server<UdpSocket> {
    /// UDP 소켓 바인딩 후 서버 생성
    pub async fn bind(addr: SocketAddr, config: Config) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("UDP PUT server bound on {}", socket.local_addr()?);
        Ok(Self::new(socket, config))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }
}

impl<T: Transport> Server<T> {
    pub fn new(transport: T, config: Config) -> Self {
        Self {
            registry: Registry::new(&config),
            transport,
            config,
            on_file_complete: None,
            stats: Arc::new(RwLock::new(ServerStats::new())),
        }
    }

    /// 파일 완성 핸들러 등록
    ///
    /// file_id마다 처음 완성되는 순간 한 번, 수신 루프 안에서 동기적으로 호출된다.
    pub fn on_file_complete<F>(&mut self, handler: F)
    where
        F: FnMut(&File, u32) + Send + 'static,
    {
        self.on_file_complete = Some(Box::new(handler));
    }

    /// 완성된 파일을 `<dir>/<file_id>.bin` 으로 저장
    ///
    /// 기존 완성 핸들러를 대체한다. 반환된 저장 태스크는 서버가 drop되면 남은 파일을 쓰고 끝난다.
    pub async fn save_completed(&mut self, dir: impl Into<PathBuf>) -> Result<JoinHandle<()>> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!("Saving completed files to {:?}", dir);

        let (tx, task) = store::spawn_writer(dir);
        self.on_file_complete(move |file, _| {
            if tx.send(file.clone()).is_err() {
                warn!("저장 태스크 종료됨, 파일 {} 저장 안 함", file.id());
            }
        });
        Ok(task)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 통계 공유 핸들
    pub fn stats_handle(&self) -> Arc<RwLock<ServerStats>> {
        self.stats.clone()
    }

    /// 통계 반환
    pub fn stats(&self) -> ServerStats {
        self.stats.read().clone()
    }

    /// 추적 중인 파일
    pub fn file(&self, file_id: FileId) -> Option<&File> {
        self.registry.get(file_id)
    }

    /// 캐시된 체크섬
    pub fn checksum(&self, file_id: FileId) -> Option<u32> {
        self.registry.checksum(file_id)
    }

    /// 추적 중인 파일 수
    pub fn tracked_files(&self) -> usize {
        self.registry.len()
    }

    /// 수신 루프
    ///
    /// 전송 계층이 길이 0을 반환하면 정상 종료, 수신 에러는 그대로 반환한다.
    pub async fn run(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let mut eviction = tokio::time::interval(self.config.eviction_interval());
        eviction.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                result = self.transport.recv_from(&mut buf) => Event::Datagram(result),
                _ = eviction.tick() => Event::Evict,
            };

            match event {
                Event::Datagram(Ok((0, _))) => {
                    info!("Transport closed, stopping server");
                    return Ok(());
                }
                Event::Datagram(Ok((len, peer))) => {
                    if let Some(ack) = self.handle_datagram(&buf[..len]) {
                        send_ack(&self.transport, &self.stats, &ack, peer).await;
                    }
                }
                Event::Datagram(Err(e)) => {
                    warn!("수신 에러, 서버 종료: {}", e);
                    return Err(e.into());
                }
                Event::Evict => {
                    self.evict_expired();
                }
            }
        }
    }

    /// 데이터그램 하나 처리 후 돌려보낼 ACK 반환
    ///
    /// 파싱에 실패하면 None (버리고 ACK 없음).
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> Option<Packet> {
        {
            let mut stats = self.stats.write();
            stats.datagrams_received += 1;
            stats.bytes_received += datagram.len() as u64;
        }

        match Packet::from_bytes(datagram) {
            Ok(packet) => Some(self.add_packet(packet)),
            Err(e) => {
                debug!("잘못된 데이터그램 ({} bytes) 버림: {}", datagram.len(), e);
                self.stats.write().malformed_datagrams += 1;
                None
            }
        }
    }

    /// 패킷을 재조립하고 ACK 생성
    ///
    /// ACK 헤더는 받은 헤더를 그대로 따르되 segment_total을 현재 파일 크기로 바꾼다.
    /// 파일이 완성되어 있으면 체크섬을 페이로드로 싣는다.
    pub fn add_packet(&mut self, packet: Packet) -> Packet {
        let header = packet.header;
        let insertion = self.registry.insert(packet, Instant::now());

        {
            let mut stats = self.stats.write();
            if insertion.new_file {
                stats.files_started += 1;
            }
            if insertion.evicted.is_some() {
                stats.files_evicted += 1;
            }
            if !insertion.accepted {
                stats.rejected_segments += 1;
            }
            if insertion.newly_completed {
                stats.files_completed += 1;
            }
        }

        if let Some(evicted) = insertion.evicted {
            info!("파일 {} 제거 (추적 파일 수 한도)", evicted);
        }
        if insertion.new_file {
            debug!("새 파일 {}: {} 세그먼트", header.file_id, header.segment_total);
        }
        if !insertion.accepted {
            debug!("세그먼트 거부: file_id={}, segment={}", header.file_id, header.sequence_number);
        }

        if insertion.newly_completed {
            if let Some(checksum) = insertion.checksum {
                self.notify_complete(header.file_id, checksum);
            }
        }

        let mut ack_header = header;
        ack_header.segment_total = insertion.size;

        match insertion.checksum {
            Some(checksum) => Packet::ack_with_checksum(&ack_header, checksum),
            None => Packet::ack(&ack_header),
        }
    }

    /// 만료된 파일 정리
    pub fn evict_expired(&mut self) -> usize {
        let evicted = self.registry.evict_expired(Instant::now());
        if !evicted.is_empty() {
            debug!("만료 파일 {}개 제거: {:?}", evicted.len(), evicted);
            self.stats.write().files_evicted += evicted.len() as u64;
        }
        evicted.len()
    }

    fn notify_complete(&mut self, file_id: FileId, checksum: u32) {
        let Some(file) = self.registry.get(file_id) else {
            return;
        };

        info!(
            "파일 {} 완료: {} 세그먼트, {} bytes, crc32c={:08X}",
            file_id,
            file.capacity(),
            file.received_bytes(),
            checksum
        );

        if let Some(handler) = self.on_file_complete.as_mut() {
            handler(file, checksum);
        }
    }
}

/// ACK 전송 (실패 시 기록만 하고 재시도하지 않음)
async fn send_ack<T: Transport>(
    transport: &T,
    stats: &RwLock<ServerStats>,
    ack: &Packet,
    peer: SocketAddr,
) {
    let datagram = ack.to_bytes();
    match transport.send_to(&datagram, peer).await {
        Ok(_) => {
            stats.write().acks_sent += 1;
        }
        Err(e) => {
            warn!("ACK 전송 실패: {} ({})", peer, e);
            stats.write().ack_send_failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc32::crc32c;
    use crate::packet::PacketType;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn put(file_id: FileId, seq: u32, total: u32, payload: &[u8]) -> Vec<u8> {
        Packet::put(file_id, seq, total, Bytes::copy_from_slice(payload))
            .to_bytes()
            .to_vec()
    }

    /// 채널 기반 전송 계층 (입력 채널이 닫히면 길이 0 반환)
    struct ChannelTransport {
        inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
        outbound: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
    }

    impl Transport for ChannelTransport {
        async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            match self.inbound.lock().await.recv().await {
                Some((datagram, peer)) => {
                    let len = datagram.len().min(buf.len());
                    buf[..len].copy_from_slice(&datagram[..len]);
                    Ok((len, peer))
                }
                None => Ok((0, "0.0.0.0:0".parse().unwrap())),
            }
        }

        async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
            self.outbound
                .send((buf.to_vec(), target))
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
            Ok(buf.len())
        }
    }

    struct NullTransport;

    impl Transport for NullTransport {
        async fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            Ok((0, "0.0.0.0:0".parse().unwrap()))
        }

        async fn send_to(&self, buf: &[u8], _target: SocketAddr) -> io::Result<usize> {
            Ok(buf.len())
        }
    }

    fn server() -> (Server<NullTransport>, Arc<Mutex<Vec<(FileId, u32)>>>) {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let mut server = Server::new(NullTransport, Config::unbounded());
        let sink = completed.clone();
        server.on_file_complete(move |file, checksum| {
            sink.lock().unwrap().push((file.id(), checksum));
        });
        (server, completed)
    }

    #[test]
    fn test_two_segment_file_completes_once() {
        let (mut server, completed) = server();

        let ack = server.handle_datagram(&put(7, 0, 2, &[0xAA])).unwrap();
        assert!(!server.file(7).unwrap().is_full());
        assert!(completed.lock().unwrap().is_empty());
        assert_eq!(ack.header.packet_type, PacketType::Ack);
        assert_eq!(ack.header.segment_total, 1);
        assert!(ack.payload.is_empty());

        let ack = server.handle_datagram(&put(7, 1, 2, &[0xBB])).unwrap();
        assert!(server.file(7).unwrap().is_full());
        let expected = crc32c(&[0xAA, 0xBB]);
        assert_eq!(completed.lock().unwrap().as_slice(), &[(7, expected)]);
        assert_eq!(ack.header.segment_total, 2);
        assert_eq!(ack.header.sequence_number, 1);
        assert_eq!(ack.checksum(), Some(expected));
    }

    #[test]
    fn test_duplicate_final_segment() {
        let (mut server, completed) = server();

        server.handle_datagram(&put(1, 0, 2, b"ab"));
        let first = server.handle_datagram(&put(1, 1, 2, b"cd")).unwrap();
        let second = server.handle_datagram(&put(1, 1, 2, b"cd")).unwrap();

        assert_eq!(first.checksum(), Some(crc32c(b"abcd")));
        assert_eq!(first.checksum(), second.checksum());
        assert_eq!(completed.lock().unwrap().len(), 1);
        assert_eq!(server.stats().files_completed, 1);
    }

    #[test]
    fn test_malformed_datagram_is_dropped() {
        let (mut server, _) = server();

        assert!(server.handle_datagram(&[0x00, 0x01, 0x02]).is_none());
        assert_eq!(server.tracked_files(), 0);

        let stats = server.stats();
        assert_eq!(stats.datagrams_received, 1);
        assert_eq!(stats.malformed_datagrams, 1);
    }

    #[test]
    fn test_rejected_segment_still_acked() {
        let (mut server, _) = server();

        server.handle_datagram(&put(2, 0, 3, b"x"));
        let ack = server.handle_datagram(&put(2, 9, 3, b"y")).unwrap();

        assert_eq!(ack.header.sequence_number, 9);
        assert_eq!(ack.header.segment_total, 1);
        assert!(ack.payload.is_empty());
        assert_eq!(server.stats().rejected_segments, 1);
    }

    #[test]
    fn test_unknown_type_is_routed() {
        let (mut server, _) = server();

        let mut datagram = put(4, 0, 1, b"z");
        datagram[8] = 5;

        let ack = server.handle_datagram(&datagram).unwrap();
        assert_eq!(ack.header.packet_type, PacketType::Ack);
        assert_eq!(ack.checksum(), Some(crc32c(b"z")));
    }

    #[test]
    fn test_files_are_independent() {
        let (mut server, completed) = server();

        server.handle_datagram(&put(1, 0, 2, b"a"));
        server.handle_datagram(&put(2, 0, 1, b"b"));
        server.handle_datagram(&put(1, 1, 2, b"c"));

        assert_eq!(server.tracked_files(), 2);
        let completed = completed.lock().unwrap();
        assert_eq!(
            completed.as_slice(),
            &[(2, crc32c(b"b")), (1, crc32c(b"ac"))]
        );
    }

    #[tokio::test]
    async fn test_run_acks_and_stops_on_closed_transport() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport {
            inbound: tokio::sync::Mutex::new(in_rx),
            outbound: out_tx,
        };
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();

        let mut server = Server::new(transport, Config::default());
        in_tx.send((put(9, 0, 1, b"hi"), peer)).unwrap();
        in_tx.send((vec![1, 2, 3], peer)).unwrap();
        drop(in_tx);

        server.run().await.unwrap();

        let (datagram, target) = out_rx.recv().await.unwrap();
        assert_eq!(target, peer);
        let ack = Packet::from_bytes(&datagram).unwrap();
        assert_eq!(ack.header.file_id, 9);
        assert_eq!(ack.checksum(), Some(crc32c(b"hi")));

        // 잘못된 데이터그램에는 ACK 없음
        assert!(out_rx.try_recv().is_err());

        let stats = server.stats();
        assert_eq!(stats.acks_sent, 1);
        assert_eq!(stats.malformed_datagrams, 1);
    }

    #[tokio::test]
    async fn test_ack_send_failure_is_ignored() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        drop(out_rx);
        let transport = ChannelTransport {
            inbound: tokio::sync::Mutex::new(in_rx),
            outbound: out_tx,
        };
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();

        let mut server = Server::new(transport, Config::default());
        in_tx.send((put(1, 0, 2, b"a"), peer)).unwrap();
        in_tx.send((put(1, 1, 2, b"b"), peer)).unwrap();
        drop(in_tx);

        server.run().await.unwrap();

        let stats = server.stats();
        assert_eq!(stats.ack_send_failures, 2);
        assert_eq!(stats.files_completed, 1);
        assert_eq!(server.checksum(1), Some(crc32c(b"ab")));
    }
}
