//! Fixed four-channel-to-stereo down-mix (§6).
//!
//! Kept in its own module, separate from the per-sample group rendering in [`crate::group`],
//! so a host that wants the raw four internal channels can bypass it (§5's non-goal on
//! pushing the down-mix out to the host).

/// `L = ch0 + ((ch2*5)>>8)`, `R = ch1 + ((ch3*5)>>8)`, both then `>>2` into the output
/// domain. `channels` is the direct mix buffer with the ACC buffer already folded in.
pub(crate) fn fold_stereo(channels: [i32; 4]) -> (i32, i32) {
    let [ch0, ch1, ch2, ch3] = channels;
    let l = ch0 + ((ch2 * 5) >> 8);
    let r = ch1 + ((ch3 * 5) >> 8);
    (l >> 2, r >> 2)
}
