//! # UDP PUT
//!
//! 단방향 UDP 파일 수신 프로토콜
//!
//! ## 핵심 특징
//! - **세그먼트 단위 전송**: 파일을 데이터그램 하나에 들어가는 세그먼트로 분할
//! - **세그먼트별 ACK**: 받은 모든 패킷에 현재 수신 세그먼트 수로 응답
//! - **CRC32C 검증**: 파일이 완성되면 ACK에 체크섬을 실어 송신자가 검증
//! - **순서 무관 재조립**: 세그먼트는 어떤 순서로 와도, 중복되어도 됨
//! - **만료 정책**: 완료/유휴 파일을 주기적으로 정리해 메모리 제한
//!
//! ## 패킷 레이아웃 (빅엔디안)
//! ```text
//! seq: u32 | total: u32 | type: u8 | file_id: u64 | payload...
//! ```

pub mod config;
pub mod crc32;
pub mod error;
pub mod file;
pub mod packet;
pub mod registry;
pub mod sender;
pub mod server;
pub mod stats;
pub mod store;
pub mod wire;

pub use config::Config;
pub use crc32::{crc32c, Crc32c};
pub use error::{Error, Result};
pub use file::File;
pub use packet::{FileId, Packet, PacketHeader, PacketType, SegmentNo};
pub use registry::Registry;
pub use sender::{split_into_packets, FileSender, SendReport};
pub use server::{Server, Transport};
pub use stats::ServerStats;
pub use store::{completed_path, write_completed};
pub use wire::{BufferReader, BufferWriter};

/// 데이터그램 최대 크기 (이더넷 MTU 1500 - IP 20 - UDP 8)
pub const MAX_DATAGRAM_SIZE: usize = 1472;

/// 세그먼트 페이로드 최대 크기
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - PacketHeader::SIZE;

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 9000;
