//! Reference (host-side) implementations of the small inline routines the
//! codegen visitor emits directly into the BPF program: `log2` for
//! `hist()`/`lhist()` bucket indexing and the MurmurHash2 stack hash used to
//! key `kstack`/`ustack` stack-trace maps.
//!
//! Grounded on `codegen_llvm.cpp`'s `log2`/`createMurmurHash2Func`: both are
//! marked always-inline "helpers"-section BPF functions there because the
//! verifier can't follow arbitrary function calls; the codegen visitor here
//! emits the equivalent instruction sequence directly via `IrBuilder`. These
//! functions are the algorithm's single source of truth, used both to
//! cross-check that emission and to aggregate/display histogram and stack-id
//! data on the runtime side without re-running BPF.

/// log2-style bucket index used by `hist()`. `k` extra linear sub-buckets
/// are kept below each power-of-two boundary for resolution.
///
/// Mirrors the commented algorithm in `codegen_llvm.cpp` exactly, including
/// the negative-input and `k`-bit masking behavior.
pub fn log2(n: i64, k: u32) -> i64 {
    if n < 0 {
        return 0;
    }
    let mask = (1i64 << k) - 1;
    if n <= mask {
        return n + 1;
    }

    let n0 = n;
    let mut n = n;
    let mut l: i64 = 0;
    for i in (0..=5).rev() {
        let threshold = 1i64 << (1i64 << i);
        let shift = if n >= threshold { 1i64 << i } else { 0 };
        n >>= shift;
        l += shift;
    }
    l -= k as i64;

    let x = (n0 >> l) & mask;
    ((l + 1) << k) + x + 1
}

/// Decode a bitfield member from its aligned raw load: one shift, one mask.
/// `access_rshift` and `mask` are exactly the two values the field analyser
/// resolves from a struct's declared `{bit_offset, bit_width}` — codegen
/// emits this same shift/mask pair as BPF ALU instructions right after the
/// aligned load; this is the reference decode used to cross-check that
/// emission and to decode bitfields on the runtime side.
pub fn decode_bitfield(raw: u64, access_rshift: u8, mask: u64) -> u64 {
    (raw >> access_rshift) & mask
}

/// Mask covering the low `width` bits, as derived from a bitfield's declared
/// bit width.
pub fn bitfield_mask(width: u8) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Bounded probe-read-str: copies up to `max_strlen` bytes of `src` (stopping
/// at the first NUL) into a scratch buffer of `max_strlen + 1` bytes, with
/// the extra byte pre-poisoned `0xFF` so a caller can distinguish "string
/// filled the whole buffer" from "string happened to end exactly at the
/// boundary" by checking for a NUL in `[0, max_strlen)`.
pub fn str_scratch(src: &[u8], max_strlen: usize) -> Vec<u8> {
    let mut buf = vec![0xFFu8; max_strlen + 1];
    let copy_len = src.iter().position(|&b| b == 0).unwrap_or(src.len()).min(max_strlen);
    buf[..copy_len].copy_from_slice(&src[..copy_len]);
    if copy_len < max_strlen {
        buf[copy_len] = 0;
    }
    buf
}

/// `true` if a `str_scratch` buffer shows no NUL within its first
/// `max_strlen` bytes — i.e. the source string was truncated.
pub fn str_scratch_is_truncated(scratch: &[u8], max_strlen: usize) -> bool {
    !scratch[..max_strlen.min(scratch.len())].contains(&0)
}

/// MurmurHash2 (64-bit variant), used to hash a captured stack trace into a
/// stable map key. `bpftrace` uses a fixed seed of 1 rather than something
/// derived from pid, since a shared stack for the same pid doesn't need to
/// be stored twice; a seed of 0 is remapped to 1 since MurmurHash2 produces
/// degenerate output for a zero seed on an empty slice.
pub fn murmur_hash_2(stack: &[u64], seed: u64) -> u64 {
    const M: u64 = 0xc6a4a7935bd1e995;
    const R: u32 = 47;

    let seed = if seed == 0 { 1 } else { seed };
    let mut id = seed ^ (stack.len() as u64).wrapping_mul(M);

    for &frame in stack {
        let mut k = frame.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        id ^= k;
        id = id.wrapping_mul(M);
    }

    id
}
