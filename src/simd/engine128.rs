//! 128-bit SIMD engine (SSE2 on x86_64; NEON on aarch64)
//!
//! Implements the [`SwSimd`] backend at the baseline width available on all
//! supported CPUs: 16 unsigned-byte lanes or 8 signed-word lanes.
//!
//! Highlights
//! - Unsigned byte comparison has no native SSE2 instruction; `cmpgt_epu8`
//!   uses the sign-bit XOR trick.
//! - `movemask` and the horizontal maxima use a store-and-scan fallback where
//!   the ISA has no direct instruction. They run once per vector row or per
//!   column, never in the innermost arithmetic.
//!
//! Safety
//! - All functions are `unsafe` and expect to execute on a CPU supporting the
//!   underlying ISA (guaranteed on the targets this crate builds for).
//! - Pointer arguments to `load`/`store` must be valid and 16-byte aligned;
//!   `V128`'s `repr(align(16))` provides this for buffer-derived pointers.

use super::types::{simd_arch, V128, __m128i};
use super::SwSimd;

/// 128-bit SIMD engine (SSE2 on x86_64, NEON on aarch64).
///
/// This is the baseline implementation that works on all modern CPUs.
#[derive(Clone, Copy)]
pub struct Engine128;

#[allow(unsafe_op_in_unsafe_fn)]
impl SwSimd for Engine128 {
    type V = __m128i;

    const LANES_U8: usize = 16;
    const LANES_I16: usize = 8;

    // ===== Creation =====

    #[inline]
    unsafe fn setzero() -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_setzero_si128()
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vdupq_n_u8(0))
        }
    }

    #[inline]
    unsafe fn set1_epu8(x: u8) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_set1_epi8(x as i8)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vdupq_n_u8(x))
        }
    }

    #[inline]
    unsafe fn set1_epi16(x: i16) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_set1_epi16(x)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_s16(simd_arch::vdupq_n_s16(x))
        }
    }

    #[inline]
    unsafe fn setlane0_epu8(x: u8) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            // Zero-extend so only the low byte is populated
            simd_arch::_mm_cvtsi32_si128(x as i32)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vsetq_lane_u8(x, simd_arch::vdupq_n_u8(0), 0))
        }
    }

    #[inline]
    unsafe fn setlane0_epi16(x: i16) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            // Mask to 16 bits first: a sign-extended negative would spill
            // into lane 1
            simd_arch::_mm_cvtsi32_si128(x as u16 as i32)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_s16(simd_arch::vsetq_lane_s16(x, simd_arch::vdupq_n_s16(0), 0))
        }
    }

    // ===== Memory =====

    #[inline]
    unsafe fn load(p: *const V128) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_load_si128(p as *const __m128i)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vld1q_u8(p as *const u8))
        }
    }

    #[inline]
    unsafe fn store(p: *mut V128, v: Self::V) {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_store_si128(p as *mut __m128i, v)
        }
        #[cfg(target_arch = "aarch64")]
        {
            simd_arch::vst1q_u8(p as *mut u8, v.as_u8())
        }
    }

    // ===== Bitwise =====

    #[inline]
    unsafe fn or_si128(a: Self::V, b: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_or_si128(a, b)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vorrq_u8(a.as_u8(), b.as_u8()))
        }
    }

    // ===== 8-bit unsigned arithmetic =====

    #[inline]
    unsafe fn adds_epu8(a: Self::V, b: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_adds_epu8(a, b)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vqaddq_u8(a.as_u8(), b.as_u8()))
        }
    }

    #[inline]
    unsafe fn subs_epu8(a: Self::V, b: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_subs_epu8(a, b)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vqsubq_u8(a.as_u8(), b.as_u8()))
        }
    }

    #[inline]
    unsafe fn max_epu8(a: Self::V, b: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_max_epu8(a, b)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vmaxq_u8(a.as_u8(), b.as_u8()))
        }
    }

    #[inline]
    unsafe fn cmpgt_epu8(a: Self::V, b: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            // SSE has no unsigned compare; flip sign bits and compare signed:
            // a >_u b  ⟺  (a XOR 0x80) >_s (b XOR 0x80)
            let sign = simd_arch::_mm_set1_epi8(0x80u8 as i8);
            simd_arch::_mm_cmpgt_epi8(
                simd_arch::_mm_xor_si128(a, sign),
                simd_arch::_mm_xor_si128(b, sign),
            )
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vcgtq_u8(a.as_u8(), b.as_u8()))
        }
    }

    // ===== 16-bit signed arithmetic =====

    #[inline]
    unsafe fn adds_epi16(a: Self::V, b: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_adds_epi16(a, b)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_s16(simd_arch::vqaddq_s16(a.as_s16(), b.as_s16()))
        }
    }

    #[inline]
    unsafe fn subs_epi16(a: Self::V, b: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_subs_epi16(a, b)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_s16(simd_arch::vqsubq_s16(a.as_s16(), b.as_s16()))
        }
    }

    #[inline]
    unsafe fn max_epi16(a: Self::V, b: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_max_epi16(a, b)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_s16(simd_arch::vmaxq_s16(a.as_s16(), b.as_s16()))
        }
    }

    #[inline]
    unsafe fn cmpgt_epi16(a: Self::V, b: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_cmpgt_epi16(a, b)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u16(simd_arch::vcgtq_s16(a.as_s16(), b.as_s16()))
        }
    }

    // ===== Byte shifts =====

    #[inline]
    unsafe fn slli_bytes_1(a: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_slli_si128(a, 1)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vextq_u8(simd_arch::vdupq_n_u8(0), a.as_u8(), 15))
        }
    }

    #[inline]
    unsafe fn slli_bytes_2(a: Self::V) -> Self::V {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_slli_si128(a, 2)
        }
        #[cfg(target_arch = "aarch64")]
        {
            __m128i::from_u8(simd_arch::vextq_u8(simd_arch::vdupq_n_u8(0), a.as_u8(), 14))
        }
    }

    // ===== Reductions =====

    #[inline]
    unsafe fn movemask_epi8(a: Self::V) -> i32 {
        #[cfg(target_arch = "x86_64")]
        {
            simd_arch::_mm_movemask_epi8(a)
        }
        #[cfg(target_arch = "aarch64")]
        {
            // No NEON movemask; store and test sign bits
            let mut tmp = [0u8; 16];
            simd_arch::vst1q_u8(tmp.as_mut_ptr(), a.as_u8());
            let mut res = 0;
            for (i, &b) in tmp.iter().enumerate() {
                if b & 0x80 != 0 {
                    res |= 1 << i;
                }
            }
            res
        }
    }

    #[inline]
    unsafe fn hmax_epu8(a: Self::V) -> u8 {
        #[cfg(target_arch = "x86_64")]
        {
            let mut tmp = [0u8; 16];
            simd_arch::_mm_storeu_si128(tmp.as_mut_ptr() as *mut __m128i, a);
            tmp.iter().copied().max().unwrap_or(0)
        }
        #[cfg(target_arch = "aarch64")]
        {
            simd_arch::vmaxvq_u8(a.as_u8())
        }
    }

    #[inline]
    unsafe fn hmax_epi16(a: Self::V) -> i16 {
        #[cfg(target_arch = "x86_64")]
        {
            let mut tmp = [0i16; 8];
            simd_arch::_mm_storeu_si128(tmp.as_mut_ptr() as *mut __m128i, a);
            tmp.iter().copied().max().unwrap_or(i16::MIN)
        }
        #[cfg(target_arch = "aarch64")]
        {
            simd_arch::vmaxvq_s16(a.as_s16())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(bytes: [u8; 16]) -> <Engine128 as SwSimd>::V {
        unsafe { Engine128::load(&V128(bytes)) }
    }

    fn unload(x: <Engine128 as SwSimd>::V) -> [u8; 16] {
        let mut out = V128::ZERO;
        unsafe { Engine128::store(&mut out, x) };
        out.0
    }

    #[test]
    fn slli_bytes_shifts_toward_higher_lanes() {
        let a = v([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
        let s1 = unload(unsafe { Engine128::slli_bytes_1(a) });
        assert_eq!(s1[0], 0);
        assert_eq!(&s1[1..], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);

        let s2 = unload(unsafe { Engine128::slli_bytes_2(a) });
        assert_eq!(&s2[..2], &[0, 0]);
        assert_eq!(&s2[2..], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14]);
    }

    #[test]
    fn setlane0_only_touches_lane_zero() {
        let a = unload(unsafe { Engine128::setlane0_epu8(0xAB) });
        assert_eq!(a[0], 0xAB);
        assert!(a[1..].iter().all(|&b| b == 0));

        // Negative i16 must not sign-extend into lane 1
        let b = unload(unsafe { Engine128::setlane0_epi16(-2) });
        assert_eq!(i16::from_le_bytes([b[0], b[1]]), -2);
        assert!(b[2..].iter().all(|&x| x == 0));
    }

    #[test]
    fn unsigned_compare_and_saturation() {
        unsafe {
            let hi = Engine128::set1_epu8(200);
            let lo = Engine128::set1_epu8(100);
            let gt = Engine128::cmpgt_epu8(hi, lo);
            assert_eq!(Engine128::movemask_epi8(gt), 0xFFFF);
            let gt2 = Engine128::cmpgt_epu8(lo, hi);
            assert_eq!(Engine128::movemask_epi8(gt2), 0);

            let sum = Engine128::adds_epu8(hi, hi);
            assert_eq!(Engine128::hmax_epu8(sum), 255);
            let diff = Engine128::subs_epu8(lo, hi);
            assert_eq!(Engine128::hmax_epu8(diff), 0);
        }
    }

    #[test]
    fn i16_saturating_ops() {
        unsafe {
            let a = Engine128::set1_epi16(i16::MAX - 10);
            let b = Engine128::set1_epi16(100);
            assert_eq!(Engine128::hmax_epi16(Engine128::adds_epi16(a, b)), i16::MAX);
            let c = Engine128::set1_epi16(i16::MIN + 10);
            assert_eq!(Engine128::hmax_epi16(Engine128::subs_epi16(c, b)), i16::MIN);
            let m = Engine128::max_epi16(a, c);
            assert_eq!(Engine128::hmax_epi16(m), i16::MAX - 10);
        }
    }
}
