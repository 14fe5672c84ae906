//! Micro-float conversions: bfloat16 and the two 8-bit float layouts.
//!
//! BFloat16 is delegated to the `half` crate's `bf16` type, which already
//! implements round-to-nearest-even truncation of a binary32, the same
//! reasoning that sends Deflate to `flate2` rather than a hand-rolled
//! inflate. FP8 E4M3/E5M2 have no equivalent widely-used crate, so they stay
//! hand-rolled bit manipulation per their layouts.

use half::bf16;

pub fn f32_to_bf16_bits(value: f32) -> u16 {
    bf16::from_f32(value).to_bits()
}

pub fn bf16_bits_to_f32(bits: u16) -> f32 {
    bf16::from_bits(bits).to_f32()
}

/// FP8 E4M3: 1 sign bit, 4 exponent bits (bias 7), 3 mantissa bits. This is
/// OCP E4M3FN, which has no infinity encoding: `exponent == 0xF && mantissa
/// == 0x7` is the sole NaN, and every other `exponent == 0xF` mantissa is an
/// ordinary finite value, topping out at 448 for `mantissa == 0x6`.
/// `exponent == 0 && mantissa == 0` is zero; otherwise subnormal for
/// `exponent == 0`.
pub fn e4m3_to_f32(byte: u8) -> f32 {
    let sign = (byte >> 7) & 0x1;
    let exponent = (byte >> 3) & 0xF;
    let mantissa = byte & 0x7;
    decode_float8(sign, exponent as i32, mantissa as u32, 4, 3, 7)
}

/// FP8 E5M2: 1 sign bit, 5 exponent bits (bias 15), 2 mantissa bits.
pub fn e5m2_to_f32(byte: u8) -> f32 {
    let sign = (byte >> 7) & 0x1;
    let exponent = (byte >> 6) & 0x1F;
    let mantissa = byte & 0x3;
    decode_float8(sign, exponent as i32, mantissa as u32, 5, 2, 15)
}

fn decode_float8(
    sign: u8,
    exponent: i32,
    mantissa: u32,
    exp_bits: u32,
    mantissa_bits: u32,
    bias: i32,
) -> f32 {
    let sign_mul = if sign == 1 { -1.0f32 } else { 1.0f32 };
    let max_exponent = (1i32 << exp_bits) - 1;
    let mantissa_scale = (1u32 << mantissa_bits) as f32;
    let is_e4m3 = exp_bits == 4 && mantissa_bits == 3;

    if exponent == max_exponent {
        if is_e4m3 {
            // E4M3FN has no infinity: only the all-ones mantissa is NaN,
            // every other mantissa here is finite (falls through below).
            if mantissa == 0x7 {
                return f32::NAN;
            }
        } else {
            return if mantissa == 0 {
                sign_mul * f32::INFINITY
            } else {
                f32::NAN
            };
        }
    }

    if exponent == 0 {
        if mantissa == 0 {
            return sign_mul * 0.0;
        }
        // Subnormal: value = mantissa/2^m * 2^(1-bias)
        let value = (mantissa as f32 / mantissa_scale) * 2f32.powi(1 - bias);
        return sign_mul * value;
    }

    let value = (1.0 + mantissa as f32 / mantissa_scale) * 2f32.powi(exponent - bias);
    sign_mul * value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bf16_round_trip_within_one_percent() {
        for x in [1.0f32, -3.5, 100.25, 0.01, 12345.678] {
            let bits = f32_to_bf16_bits(x);
            let back = bf16_bits_to_f32(bits);
            let relative_error = ((back - x) / x).abs();
            assert!(relative_error <= 0.01, "x={x} back={back}");
        }
    }

    #[test]
    fn bf16_preserves_zero_sign_and_infinity() {
        assert_eq!(bf16_bits_to_f32(f32_to_bf16_bits(0.0)).to_bits(), 0f32.to_bits());
        assert!(bf16_bits_to_f32(f32_to_bf16_bits(f32::INFINITY)).is_infinite());
        assert!(bf16_bits_to_f32(f32_to_bf16_bits(f32::NAN)).is_nan());
    }

    #[test]
    fn e4m3_zero_and_nan() {
        assert_eq!(e4m3_to_f32(0b0_0000_000), 0.0);
        assert!(e4m3_to_f32(0b0_1111_111).is_nan());
        assert!(e4m3_to_f32(0b1_1111_111).is_nan());
    }

    #[test]
    fn e4m3_max_finite_within_tolerance() {
        // 448 is the largest finite E4M3 magnitude.
        let max = e4m3_to_f32(0b0_1111_110);
        assert!((max - 448.0).abs() / 448.0 <= 0.10);
    }

    #[test]
    fn e5m2_zero_and_special_values() {
        assert_eq!(e5m2_to_f32(0b0_00000_00), 0.0);
        assert_eq!(e5m2_to_f32(0b0_11111_00), f32::INFINITY);
        assert!(e5m2_to_f32(0b0_11111_01).is_nan());
    }
}
