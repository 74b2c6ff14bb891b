//! SIMD type aliases and architecture bindings
//!
//! A tiny portability layer so the rest of the `simd` code can refer to
//! `simd_arch` and `__m128i` uniformly on both x86_64 and aarch64.
//!
//! - On x86_64 we re-export `std::arch::x86_64` as `simd_arch` and use the
//!   native `__m128i` type.
//! - On aarch64 we re-export `std::arch::aarch64` as `simd_arch` and define a
//!   transparent wrapper `__m128i` backed by `uint8x16_t`, with helper methods
//!   for lossless reinterpretation between the element widths the engine uses.
//!
//! Safety: all reinterpretation methods are plain bitcasts (no lane
//! reordering), implemented via NEON `vreinterpret` intrinsics.

#[cfg(target_arch = "x86_64")]
pub use std::arch::x86_64 as simd_arch;

#[cfg(target_arch = "aarch64")]
pub use std::arch::aarch64 as simd_arch;

/// Type alias for `__m128i` on x86_64.
#[allow(non_camel_case_types)]
#[cfg(target_arch = "x86_64")]
pub type __m128i = simd_arch::__m128i;

/// Transparent `__m128i` wrapper on aarch64 (NEON), backed by `uint8x16_t`.
#[allow(non_camel_case_types)]
#[cfg(target_arch = "aarch64")]
#[derive(Copy, Clone)]
#[repr(transparent)]
pub struct __m128i(pub simd_arch::uint8x16_t);

#[cfg(target_arch = "aarch64")]
impl __m128i {
    /// View as unsigned 8-bit lanes.
    #[inline]
    pub fn as_u8(self) -> simd_arch::uint8x16_t {
        self.0
    }

    /// Construct from unsigned 8-bit lanes.
    #[inline]
    pub fn from_u8(v: simd_arch::uint8x16_t) -> Self {
        Self(v)
    }

    /// View as signed 16-bit lanes.
    #[inline]
    pub fn as_s16(self) -> simd_arch::int16x8_t {
        unsafe { simd_arch::vreinterpretq_s16_u8(self.0) }
    }

    /// Construct from signed 16-bit lanes by reinterpretation.
    #[inline]
    pub fn from_s16(v: simd_arch::int16x8_t) -> Self {
        Self(unsafe { simd_arch::vreinterpretq_u8_s16(v) })
    }

    /// View as unsigned 16-bit lanes.
    #[inline]
    pub fn as_u16(self) -> simd_arch::uint16x8_t {
        unsafe { simd_arch::vreinterpretq_u16_u8(self.0) }
    }

    /// Construct from unsigned 16-bit lanes by reinterpretation.
    #[inline]
    pub fn from_u16(v: simd_arch::uint16x8_t) -> Self {
        Self(unsafe { simd_arch::vreinterpretq_u8_u16(v) })
    }
}

/// One 16-byte-aligned 128-bit storage cell.
///
/// This is the element type of [`crate::vecbuf::VecBuf`]. The `align(16)`
/// guarantee is what makes the aligned load/store paths of the engine legal;
/// the engine reinterprets `*const V128` as its native vector pointer type.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct V128(pub [u8; 16]);

impl V128 {
    pub const ZERO: V128 = V128([0; 16]);
}
