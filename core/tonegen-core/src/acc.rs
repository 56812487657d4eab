//! 18-bit saturating accumulator path for `accon=1` PCM voices (§4.7).

pub(crate) const ACC_MIN: i32 = -131072;
pub(crate) const ACC_MAX: i32 = 131071;

pub(crate) fn sat18(x: i64) -> i32 {
    x.clamp(i64::from(ACC_MIN), i64::from(ACC_MAX)) as i32
}

/// Steps 1-2 of §4.7: multiply by `accumulation_factor` and saturate to 18 bits. This is
/// the value S6 calls "the accumulator contribution before channel attenuation" — it is
/// deliberately *not* yet right-shifted back down (that happens in
/// [`restore_16bit_domain`]), since §8's testable property is phrased against this exact
/// intermediate.
pub(crate) fn accumulate(sample: i32, tl: u8) -> i32 {
    let factor = if tl == 0 { 2 } else { i64::from(tl) * 2 };
    sat18(i64::from(sample) * factor)
}

/// Step 3: arithmetic right shift by 2, restoring the 16-bit codomain while keeping the
/// clipping artefact audible.
pub(crate) fn restore_16bit_domain(saturated: i32) -> i32 {
    saturated >> 2
}

/// Step 4: per-channel attenuate and fold into the ACC mix buffer, re-saturating to 18
/// bits on every add.
pub(crate) fn fold_into_channel(acc_buffer_value: i32, restored: i32, chan_attn: u32) -> i32 {
    let attenuated = (i64::from(restored) * i64::from(chan_attn)) >> 16;
    sat18(i64::from(acc_buffer_value) + attenuated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn s6_acc_distortion() {
        // §8 S6: accon=1, tl=4, sample=+20000 -> sat18(20000*8) = 131071
        assert_eq!(accumulate(20000, 4), 131071);
    }

    #[test]
    fn tl_zero_uses_factor_two() {
        assert_eq!(accumulate(1000, 0), 2000);
    }

    #[test]
    fn negative_samples_saturate_at_lower_bound() {
        assert_eq!(accumulate(-20000, 4), ACC_MIN);
    }

    #[test]
    fn channel_fold_stays_in_range() {
        let mut acc = 0;
        for _ in 0..10_000 {
            acc = fold_into_channel(acc, accumulate(30000, 10), 65536);
            assert!(acc >= ACC_MIN && acc <= ACC_MAX);
        }
    }
}
