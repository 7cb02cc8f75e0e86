//! SIMD-accelerated unpacking for block decompression
//!
//! Packed values use byte-aligned widths (0, 8, 16 or 32 bits) so decoding is
//! a straight widening load rather than bit arithmetic. Platform support:
//! - NEON on aarch64
//! - SSE4.1 / AVX2 on x86_64
//! - Scalar fallback elsewhere

#[cfg(target_arch = "aarch64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod neon {
    use std::arch::aarch64::*;

    #[target_feature(enable = "neon")]
    pub unsafe fn unpack_8bit(input: &[u8], output: &mut [u32], count: usize) {
        let chunks = count / 16;
        for chunk in 0..chunks {
            let base = chunk * 16;
            let bytes = vld1q_u8(input.as_ptr().add(base));

            let low16 = vmovl_u8(vget_low_u8(bytes));
            let high16 = vmovl_u8(vget_high_u8(bytes));

            let out_ptr = output.as_mut_ptr().add(base);
            vst1q_u32(out_ptr, vmovl_u16(vget_low_u16(low16)));
            vst1q_u32(out_ptr.add(4), vmovl_u16(vget_high_u16(low16)));
            vst1q_u32(out_ptr.add(8), vmovl_u16(vget_low_u16(high16)));
            vst1q_u32(out_ptr.add(12), vmovl_u16(vget_high_u16(high16)));
        }

        let base = chunks * 16;
        for i in base..count {
            output[i] = input[i] as u32;
        }
    }

    #[target_feature(enable = "neon")]
    pub unsafe fn unpack_16bit(input: &[u8], output: &mut [u32], count: usize) {
        let chunks = count / 8;
        for chunk in 0..chunks {
            let base = chunk * 8;
            let vals = vld1q_u16(input.as_ptr().add(base * 2) as *const u16);

            let out_ptr = output.as_mut_ptr().add(base);
            vst1q_u32(out_ptr, vmovl_u16(vget_low_u16(vals)));
            vst1q_u32(out_ptr.add(4), vmovl_u16(vget_high_u16(vals)));
        }

        let base = chunks * 8;
        for i in base..count {
            let idx = i * 2;
            output[i] = u16::from_le_bytes([input[idx], input[idx + 1]]) as u32;
        }
    }
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod sse {
    use std::arch::x86_64::*;

    #[target_feature(enable = "sse2", enable = "sse4.1")]
    pub unsafe fn unpack_8bit(input: &[u8], output: &mut [u32], count: usize) {
        let chunks = count / 16;
        for chunk in 0..chunks {
            let base = chunk * 16;
            let bytes = _mm_loadu_si128(input.as_ptr().add(base) as *const __m128i);

            let out_ptr = output.as_mut_ptr().add(base);
            _mm_storeu_si128(out_ptr as *mut __m128i, _mm_cvtepu8_epi32(bytes));
            _mm_storeu_si128(
                out_ptr.add(4) as *mut __m128i,
                _mm_cvtepu8_epi32(_mm_srli_si128(bytes, 4)),
            );
            _mm_storeu_si128(
                out_ptr.add(8) as *mut __m128i,
                _mm_cvtepu8_epi32(_mm_srli_si128(bytes, 8)),
            );
            _mm_storeu_si128(
                out_ptr.add(12) as *mut __m128i,
                _mm_cvtepu8_epi32(_mm_srli_si128(bytes, 12)),
            );
        }

        let base = chunks * 16;
        for i in base..count {
            output[i] = input[i] as u32;
        }
    }

    #[target_feature(enable = "sse2", enable = "sse4.1")]
    pub unsafe fn unpack_16bit(input: &[u8], output: &mut [u32], count: usize) {
        let chunks = count / 8;
        for chunk in 0..chunks {
            let base = chunk * 8;
            let vals = _mm_loadu_si128(input.as_ptr().add(base * 2) as *const __m128i);

            let out_ptr = output.as_mut_ptr().add(base);
            _mm_storeu_si128(out_ptr as *mut __m128i, _mm_cvtepu16_epi32(vals));
            _mm_storeu_si128(
                out_ptr.add(4) as *mut __m128i,
                _mm_cvtepu16_epi32(_mm_srli_si128(vals, 8)),
            );
        }

        let base = chunks * 8;
        for i in base..count {
            let idx = i * 2;
            output[i] = u16::from_le_bytes([input[idx], input[idx + 1]]) as u32;
        }
    }

    #[inline]
    pub fn is_available() -> bool {
        is_x86_feature_detected!("sse4.1")
    }
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod avx2 {
    use std::arch::x86_64::*;

    #[target_feature(enable = "avx2")]
    pub unsafe fn unpack_8bit(input: &[u8], output: &mut [u32], count: usize) {
        let chunks = count / 16;
        for chunk in 0..chunks {
            let base = chunk * 16;
            let bytes = _mm_loadu_si128(input.as_ptr().add(base) as *const __m128i);

            let out_ptr = output.as_mut_ptr().add(base);
            _mm256_storeu_si256(out_ptr as *mut __m256i, _mm256_cvtepu8_epi32(bytes));
            _mm256_storeu_si256(
                out_ptr.add(8) as *mut __m256i,
                _mm256_cvtepu8_epi32(_mm_srli_si128(bytes, 8)),
            );
        }

        let base = chunks * 16;
        for i in base..count {
            output[i] = input[i] as u32;
        }
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn unpack_16bit(input: &[u8], output: &mut [u32], count: usize) {
        let chunks = count / 16;
        for chunk in 0..chunks {
            let base = chunk * 16;
            let in_ptr = input.as_ptr().add(base * 2);
            let lo = _mm_loadu_si128(in_ptr as *const __m128i);
            let hi = _mm_loadu_si128(in_ptr.add(16) as *const __m128i);

            let out_ptr = output.as_mut_ptr().add(base);
            _mm256_storeu_si256(out_ptr as *mut __m256i, _mm256_cvtepu16_epi32(lo));
            _mm256_storeu_si256(out_ptr.add(8) as *mut __m256i, _mm256_cvtepu16_epi32(hi));
        }

        let base = chunks * 16;
        for i in base..count {
            let idx = i * 2;
            output[i] = u16::from_le_bytes([input[idx], input[idx + 1]]) as u32;
        }
    }

    #[inline]
    pub fn is_available() -> bool {
        is_x86_feature_detected!("avx2")
    }
}

mod scalar {
    #[inline]
    pub fn unpack_8bit(input: &[u8], output: &mut [u32], count: usize) {
        for (out, &byte) in output.iter_mut().zip(input).take(count) {
            *out = byte as u32;
        }
    }

    #[inline]
    pub fn unpack_16bit(input: &[u8], output: &mut [u32], count: usize) {
        for (i, out) in output.iter_mut().enumerate().take(count) {
            let idx = i * 2;
            *out = u16::from_le_bytes([input[idx], input[idx + 1]]) as u32;
        }
    }

    #[inline]
    pub fn unpack_32bit(input: &[u8], output: &mut [u32], count: usize) {
        for (i, out) in output.iter_mut().enumerate().take(count) {
            let idx = i * 4;
            *out = u32::from_le_bytes([input[idx], input[idx + 1], input[idx + 2], input[idx + 3]]);
        }
    }
}

/// Unpack 8-bit packed values to u32
#[inline]
pub fn unpack_8bit(input: &[u8], output: &mut [u32], count: usize) {
    #[cfg(target_arch = "aarch64")]
    {
        unsafe {
            neon::unpack_8bit(input, output, count);
        }
        return;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if avx2::is_available() {
            unsafe {
                avx2::unpack_8bit(input, output, count);
            }
            return;
        }
        if sse::is_available() {
            unsafe {
                sse::unpack_8bit(input, output, count);
            }
            return;
        }
    }

    #[allow(unreachable_code)]
    scalar::unpack_8bit(input, output, count);
}

/// Unpack 16-bit packed values to u32
#[inline]
pub fn unpack_16bit(input: &[u8], output: &mut [u32], count: usize) {
    #[cfg(target_arch = "aarch64")]
    {
        unsafe {
            neon::unpack_16bit(input, output, count);
        }
        return;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if avx2::is_available() {
            unsafe {
                avx2::unpack_16bit(input, output, count);
            }
            return;
        }
        if sse::is_available() {
            unsafe {
                sse::unpack_16bit(input, output, count);
            }
            return;
        }
    }

    #[allow(unreachable_code)]
    scalar::unpack_16bit(input, output, count);
}

/// Unpack 32-bit values to u32 (plain LE copy)
#[inline]
pub fn unpack_32bit(input: &[u8], output: &mut [u32], count: usize) {
    scalar::unpack_32bit(input, output, count);
}

/// Bit width rounded up to a byte-aligned, widening-friendly size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RoundedBitWidth {
    Zero = 0,
    Bits8 = 8,
    Bits16 = 16,
    Bits32 = 32,
}

impl RoundedBitWidth {
    /// Smallest rounded width able to hold `max_value`
    #[inline]
    pub fn for_value(max_value: u32) -> Self {
        match max_value {
            0 => RoundedBitWidth::Zero,
            1..=0xFF => RoundedBitWidth::Bits8,
            0x100..=0xFFFF => RoundedBitWidth::Bits16,
            _ => RoundedBitWidth::Bits32,
        }
    }

    #[inline]
    pub fn from_u8(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(RoundedBitWidth::Zero),
            8 => Some(RoundedBitWidth::Bits8),
            16 => Some(RoundedBitWidth::Bits16),
            32 => Some(RoundedBitWidth::Bits32),
            _ => None,
        }
    }

    #[inline]
    pub fn bytes_per_value(self) -> usize {
        self as usize / 8
    }
}
