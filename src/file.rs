//! 재조립 중인 파일
//!
//! - 세그먼트 번호로 키가 매겨진 희소 세그먼트 집합
//! - 같은 번호의 세그먼트는 한 번만 존재 (재수신 시 덮어씀)
//! - 모든 세그먼트가 모였을 때만 순서대로 바이트를 꺼낼 수 있음

use std::collections::HashMap;
use std::io::Write;

use bytes::Bytes;

use crate::crc32::Crc32c;
use crate::packet::{FileId, Packet, SegmentNo};

/// 메모리 내 파일 (전송 중)
#[derive(Debug, Clone)]
pub struct File {
    id: FileId,

    /// 전체 세그먼트 수 (첫 패킷의 segment_total)
    capacity: u32,

    /// 수신된 세그먼트 (0..capacity 범위의 번호만 들어감)
    segments: HashMap<SegmentNo, Bytes>,
}

impl File {
    pub fn new(id: FileId, capacity: u32) -> Self {
        Self {
            id,
            capacity,
            segments: HashMap::new(),
        }
    }

    /// 세그먼트 삽입
    ///
    /// 파일 ID가 다르거나 `segment_no >= capacity`이면 아무것도 바꾸지 않고 false를 반환한다.
    pub fn add_segment(&mut self, file_id: FileId, segment_no: SegmentNo, data: Bytes) -> bool {
        if file_id != self.id || segment_no >= self.capacity {
            return false;
        }

        self.segments.insert(segment_no, data);
        true
    }

    /// 패킷 헤더의 file_id/sequence_number와 페이로드로 세그먼트 삽입
    pub fn add_packet(&mut self, packet: Packet) -> bool {
        let header = packet.header;
        self.add_segment(header.file_id, header.sequence_number, packet.into_payload())
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    /// 현재 수신된 세그먼트 수
    pub fn size(&self) -> u32 {
        // 키는 항상 capacity 미만이라 u32 범위를 넘지 않는다
        self.segments.len() as u32
    }

    /// 전체 세그먼트 수
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 모든 세그먼트 수신 여부
    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    pub fn contains(&self, segment_no: SegmentNo) -> bool {
        self.segments.contains_key(&segment_no)
    }

    /// 누락된 세그먼트 번호 목록
    pub fn missing_segments(&self) -> Vec<SegmentNo> {
        (0..self.capacity)
            .filter(|segment_no| !self.segments.contains_key(segment_no))
            .collect()
    }

    /// 수신된 페이로드 바이트 합계
    pub fn received_bytes(&self) -> usize {
        self.segments.values().map(Bytes::len).sum()
    }

    /// 세그먼트 0부터 capacity-1까지 순서대로. 완전하지 않으면 None.
    pub fn segments(&self) -> Option<Vec<&[u8]>> {
        (0..self.capacity)
            .map(|segment_no| self.segments.get(&segment_no).map(|segment| &segment[..]))
            .collect()
    }

    /// 파일 전체 바이트의 순방향 이터레이터. 완전하지 않으면 None.
    pub fn bytes(&self) -> Option<impl Iterator<Item = u8> + '_> {
        self.segments()
            .map(|segments| segments.into_iter().flat_map(|segment| segment.iter().copied()))
    }

    /// 완성된 파일 데이터 추출
    pub fn to_vec(&self) -> Option<Vec<u8>> {
        let segments = self.segments()?;
        let mut data = Vec::with_capacity(segments.iter().map(|s| s.len()).sum());
        for segment in segments {
            data.extend_from_slice(segment);
        }
        Some(data)
    }

    /// 완성된 파일의 CRC32C
    pub fn checksum(&self) -> Option<u32> {
        let segments = self.segments()?;
        let mut crc = Crc32c::new();
        for segment in segments {
            crc.update(segment);
        }
        Some(crc.finalize())
    }

    /// 완성된 파일을 writer로 쓴다. 완전하지 않으면 `ErrorKind::InvalidInput`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let segments = self.segments().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "file {} incomplete: {}/{} segments",
                    self.id,
                    self.size(),
                    self.capacity
                ),
            )
        })?;

        for segment in segments {
            writer.write_all(segment)?;
        }
        writer.flush()
    }
}
