//! 에러 타입 정의

use thiserror::Error;

/// UDP PUT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("버퍼 부족: {needed} bytes 필요, {remaining} bytes 남음")]
    Truncated { needed: usize, remaining: usize },

    #[error("읽기 폭 초과: {width} bytes 요청, 대상 타입은 {max} bytes")]
    WidthTooLarge { width: usize, max: usize },

    #[error("유효하지 않은 세그먼트 크기: {size} (1 ~ {max})")]
    InvalidSegmentSize { size: usize, max: usize },

    #[error("세그먼트 수 초과: {count}")]
    TooManySegments { count: usize },

    #[error("CRC 불일치: file_id={file_id}, expected {expected:08X}, got {got:08X}")]
    ChecksumMismatch { file_id: u64, expected: u32, got: u32 },

    #[error("전송 미완료: file_id={file_id}, {acked}/{total} 세그먼트 ACK")]
    Incomplete { file_id: u64, acked: usize, total: usize },

    #[error("체크섬 없는 완료 ACK: file_id={file_id}")]
    MissingChecksum { file_id: u64 },

    #[error("전송률 한도보다 큰 데이터그램: {len} bytes")]
    RateLimited { len: usize },
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
