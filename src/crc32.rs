//! CRC32C (Castagnoli) 체크섬
//!
//! 반사(reflected) 다항식 0x82F63B78, 시작과 끝에서 상태를 비트 반전한다 (CRC-32/ISCSI).
//! 테이블 없이 바이트 단위로 계산하며 입력을 어떻게 나눠 넣어도 결과가 같다.

use crc::{Crc, Digest, NoTable, CRC_32_ISCSI};

/// 테이블 없는 CRC-32/ISCSI 계산기
const CASTAGNOLI: Crc<u32, NoTable> = Crc::<u32, NoTable>::new(&CRC_32_ISCSI);

/// 스트리밍 CRC32C 계산기
pub struct Crc32c {
    digest: Digest<'static, u32, NoTable>,
}

impl Crc32c {
    pub fn new() -> Self {
        Self {
            digest: CASTAGNOLI.digest(),
        }
    }

    #[inline]
    pub fn update_byte(&mut self, byte: u8) {
        self.digest.update(&[byte]);
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub fn update_iter<I: IntoIterator<Item = u8>>(&mut self, bytes: I) {
        for byte in bytes {
            self.update_byte(byte);
        }
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for Crc32c {
    fn default() -> Self {
        Self::new()
    }
}

/// 바이트 슬라이스의 CRC32C
pub fn crc32c(bytes: &[u8]) -> u32 {
    CASTAGNOLI.checksum(bytes)
}

/// 임의의 순방향 바이트 시퀀스의 CRC32C
pub fn crc32c_iter<I: IntoIterator<Item = u8>>(bytes: I) -> u32 {
    let mut crc = Crc32c::new();
    crc.update_iter(bytes);
    crc.finalize()
}
