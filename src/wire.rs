//! 와이어 코덱
//!
//! - `BufferReader`: 불변 버퍼 위의 커서 기반 빅엔디안 리더
//! - `BufferWriter`: 빅엔디안(네트워크 바이트 순서)으로 append 하는 라이터
//!
//! 호스트 바이트 순서와 무관하게 항상 네트워크 바이트 순서로 읽고 쓴다.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// 와이어에서 읽을 수 있는 정수 타입
pub trait WireInt: Copy {
    /// 타입의 바이트 폭
    const SIZE: usize;

    /// 부호 있는 타입 여부 (부호 확장 필요 판단용)
    const SIGNED: bool;

    /// 하위 `SIZE` 바이트를 잘라 타입으로 변환
    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_wire_int {
    ($($ty:ty => $signed:expr),* $(,)?) => {
        $(
            impl WireInt for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
                const SIGNED: bool = $signed;

                #[inline]
                fn from_bits(bits: u64) -> Self {
                    bits as $ty
                }
            }
        )*
    };
}

impl_wire_int!(
    u8 => false,
    u16 => false,
    u32 => false,
    u64 => false,
    i8 => true,
    i16 => true,
    i32 => true,
    i64 => true,
);

/// 커서 기반 버퍼 리더
///
/// 요청한 바이트가 남아 있지 않으면 `Error::Truncated`를 반환한다.
/// 실패한 호출 이후의 커서 위치는 보장하지 않으므로 호출자는 첫 실패에서 파싱을 중단해야 한다.
#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// 전체 버퍼 크기
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 현재 커서 위치
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 남은 바이트 수
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn has_bytes(&self, count: usize) -> bool {
        count <= self.remaining()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read()
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read()
    }

    /// 타입 폭 전체를 읽는다
    pub fn read<T: WireInt>(&mut self) -> Result<T> {
        self.read_n_bytes(T::SIZE)
    }

    /// `num_bytes` 바이트를 빅엔디안 정수로 읽는다.
    ///
    /// `num_bytes`가 타입 폭보다 작고 타입이 부호 있는 경우 첫 바이트의 최상위 비트로 부호 확장한다.
    pub fn read_n_bytes<T: WireInt>(&mut self, num_bytes: usize) -> Result<T> {
        if num_bytes > T::SIZE {
            return Err(Error::WidthTooLarge {
                width: num_bytes,
                max: T::SIZE,
            });
        }

        let bytes = self.read_bytes(num_bytes)?;
        let mut bits = bytes
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));

        if T::SIGNED && num_bytes > 0 && num_bytes < T::SIZE {
            let shift = 64 - 8 * num_bytes as u32;
            bits = (((bits << shift) as i64) >> shift) as u64;
        }

        Ok(T::from_bits(bits))
    }

    /// `count` 바이트를 그대로 읽는다
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if !self.has_bytes(count) {
            return Err(Error::Truncated {
                needed: count,
                remaining: self.remaining(),
            });
        }

        let buf = self.buf;
        let bytes = &buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// 남은 바이트 전부를 읽는다 (항상 성공)
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let buf = self.buf;
        let bytes = &buf[self.pos..];
        self.pos = buf.len();
        bytes
    }
}

/// append 전용 버퍼 라이터
#[derive(Debug, Default)]
pub struct BufferWriter {
    buf: BytesMut,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn append_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn append_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn append_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    pub fn append_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 완성된 버퍼를 꺼낸다. 이후 라이터는 빈 버퍼를 가진다.
    pub fn take_buf(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}
