//! 프로토콜 패킷 정의
//!
//! 모든 정수는 빅엔디안이며 길이 필드는 없다. 페이로드는 "헤더 뒤의 나머지 전부"이다.
//!
//! ```text
//! offset  size  field
//! 0       4     sequence_number (u32)
//! 4       4     segment_total   (u32)
//! 8       1     type            (u8: 0=ACK, 1=PUT, 그 외=UNKNOWN)
//! 9       8     file_id         (u64)
//! 17      N     payload         (데이터그램의 나머지 바이트)
//! ```

use bytes::Bytes;

use crate::wire::{BufferReader, BufferWriter};
use crate::{Result, MAX_DATAGRAM_SIZE};

/// 파일 ID
pub type FileId = u64;

/// 세그먼트 번호 (파일 내 0부터 시작하는 인덱스)
pub type SegmentNo = u32;

/// 패킷 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// 수신 확인 (수신자 → 송신자)
    Ack = 0,

    /// 세그먼트 데이터 (송신자 → 수신자)
    Put = 1,

    /// 알 수 없는 타입 바이트
    Unknown = 0xFF,
}

impl From<u8> for PacketType {
    fn from(value: u8) -> Self {
        match value {
            0 => PacketType::Ack,
            1 => PacketType::Put,
            _ => PacketType::Unknown,
        }
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        value as u8
    }
}

/// 패킷 헤더
///
/// 헤더만으로 패킷이 어느 파일의 몇 번째 세그먼트인지 결정된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// 세그먼트 번호
    pub sequence_number: SegmentNo,

    /// 파일의 총 세그먼트 수 (ACK에서는 현재까지 수신한 세그먼트 수)
    pub segment_total: u32,

    /// 패킷 타입
    pub packet_type: PacketType,

    /// 파일 ID
    pub file_id: FileId,
}

impl PacketHeader {
    /// 직렬화된 헤더 크기
    pub const SIZE: usize = 4 + 4 + 1 + 8;

    pub fn new(
        packet_type: PacketType,
        file_id: FileId,
        sequence_number: SegmentNo,
        segment_total: u32,
    ) -> Self {
        Self {
            sequence_number,
            segment_total,
            packet_type,
            file_id,
        }
    }

    /// 고정 순서로 헤더 필드를 읽는다: seq → total → type → file_id
    pub fn parse(reader: &mut BufferReader<'_>) -> Result<Self> {
        let sequence_number = reader.read_u32()?;
        let segment_total = reader.read_u32()?;
        let packet_type = PacketType::from(reader.read_u8()?);
        let file_id = reader.read_u64()?;

        Ok(Self {
            sequence_number,
            segment_total,
            packet_type,
            file_id,
        })
    }

    pub fn serialize(&self, writer: &mut BufferWriter) {
        writer.append_u32(self.sequence_number);
        writer.append_u32(self.segment_total);
        writer.append_u8(self.packet_type.into());
        writer.append_u64(self.file_id);
    }
}

/// 프로토콜 패킷 (데이터그램 하나에 패킷 하나)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// 패킷 헤더
    pub header: PacketHeader,

    /// 페이로드 (비어 있을 수 있음)
    pub payload: Bytes,
}

impl Packet {
    /// 최대 데이터그램 크기 (헤더 포함)
    pub const MAX_SIZE: usize = MAX_DATAGRAM_SIZE;

    pub fn new(header: PacketHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// PUT 패킷 생성
    pub fn put(
        file_id: FileId,
        sequence_number: SegmentNo,
        segment_total: u32,
        payload: Bytes,
    ) -> Self {
        Self::new(
            PacketHeader::new(PacketType::Put, file_id, sequence_number, segment_total),
            payload,
        )
    }

    /// 주어진 헤더를 복사하고 타입만 ACK로 바꾼 빈 ACK
    pub fn ack(header: &PacketHeader) -> Self {
        Self::new(
            PacketHeader {
                packet_type: PacketType::Ack,
                ..*header
            },
            Bytes::new(),
        )
    }

    /// 4바이트 빅엔디안 체크섬을 페이로드로 가진 ACK
    pub fn ack_with_checksum(header: &PacketHeader, checksum: u32) -> Self {
        let mut writer = BufferWriter::with_capacity(4);
        writer.append_u32(checksum);

        let mut ack = Self::ack(header);
        ack.payload = writer.take_buf();
        ack
    }

    /// 헤더를 읽은 뒤 남은 바이트 전부를 페이로드로 읽는다.
    ///
    /// 헤더 필드 하나라도 읽지 못하면 실패한다. 타입 바이트가 0/1이 아니면 실패하지 않고 `Unknown`이 된다.
    pub fn parse(reader: &mut BufferReader<'_>) -> Result<Self> {
        let header = PacketHeader::parse(reader)?;
        let payload = Bytes::copy_from_slice(reader.read_remaining());

        Ok(Self { header, payload })
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(&mut BufferReader::new(bytes))
    }

    /// 헤더 다음 페이로드를 쓴다. 빈 페이로드는 아무것도 쓰지 않는다.
    pub fn serialize(&self, writer: &mut BufferWriter) {
        self.header.serialize(writer);
        if !self.payload.is_empty() {
            writer.append_slice(&self.payload);
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut writer = BufferWriter::with_capacity(self.encoded_len());
        self.serialize(&mut writer);
        writer.take_buf()
    }

    /// 직렬화된 크기
    pub fn encoded_len(&self) -> usize {
        PacketHeader::SIZE + self.payload.len()
    }

    pub fn is_ack(&self) -> bool {
        self.header.packet_type == PacketType::Ack
    }

    /// ACK 페이로드의 체크섬 (완료된 파일에 대한 ACK만 가짐)
    pub fn checksum(&self) -> Option<u32> {
        if !self.is_ack() || self.payload.len() < 4 {
            return None;
        }
        BufferReader::new(&self.payload).read_u32().ok()
    }

    /// 페이로드를 꺼낸다
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}
