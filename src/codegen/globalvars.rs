//! Global variable sections: the two conceptual BPF global-data regions a
//! compiled program gets.
//!
//! `ro` holds read-only constant byte blobs (format strings and other
//! static data referenced by offset rather than copied into every probe
//! body that uses them). `rw` is a per-CPU read-write scratch area for
//! non-map-backed variables — a `@var` that's never used as a map key, or
//! a temporary too wide for a single register — one row per CPU slot so
//! two probes running on different CPUs never alias the same scratch word,
//! mirroring the per-CPU layout `maps::MapStorage` uses for `PerCpu*` maps.
//!
//! `max_cpu_mask` enforces the same power-of-two-minus-one masking the
//! codegen visitor applies at every per-CPU index it emits, so a CPU id
//! that overflows `config::MAX_CPU_ID` can't select a row outside the
//! array's bounds.

use crate::config::Config;

/// Width of one RW scratch slot. 8 bytes covers every scalar `SizedType`
/// this crate models; wider values (tuples, buffers) occupy consecutive
/// slots.
pub const SLOT_SIZE: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct GlobalVars {
    pub ro: Vec<u8>,
    /// `rw[cpu][slot]`.
    rw: Vec<Vec<u64>>,
    cpu_mask: u32,
}

impl GlobalVars {
    pub fn new(config: &Config) -> Self {
        let cpu_mask = max_cpu_mask(config);
        Self { ro: Vec::new(), rw: vec![Vec::new(); cpu_mask as usize + 1], cpu_mask }
    }

    /// Append a constant blob to the RO section, returning its byte offset.
    pub fn intern_constant(&mut self, bytes: &[u8]) -> usize {
        let offset = self.ro.len();
        self.ro.extend_from_slice(bytes);
        offset
    }

    /// Reserve one more RW scratch slot on every CPU row, returning the
    /// slot index shared across all of them.
    pub fn allocate_slot(&mut self) -> usize {
        let slot = self.rw[0].len();
        for row in &mut self.rw {
            row.push(0);
        }
        slot
    }

    /// Masks `cpu` into range before indexing a scratch row, the same
    /// bitwise-AND the codegen visitor emits ahead of every RW access.
    pub fn masked_cpu(&self, cpu: u32) -> u32 {
        cpu & self.cpu_mask
    }

    pub fn read_slot(&self, cpu: u32, slot: usize) -> u64 {
        self.rw[self.masked_cpu(cpu) as usize][slot]
    }

    pub fn write_slot(&mut self, cpu: u32, slot: usize, value: u64) {
        let cpu = self.masked_cpu(cpu);
        self.rw[cpu as usize][slot] = value;
    }

    pub fn ro_size(&self) -> usize {
        self.ro.len()
    }

    /// Total RW section size: one row per CPU slot, `SLOT_SIZE` bytes per
    /// allocated slot.
    pub fn rw_size(&self) -> usize {
        self.rw.first().map_or(0, |row| row.len()) * SLOT_SIZE * self.rw.len()
    }
}

/// Smallest power of two minus one that's still `>= config::MAX_CPU_ID`,
/// so the mask a probe applies to a live CPU id always stays in bounds
/// even if the host reports more CPUs than `MAX_CPU_ID`.
fn max_cpu_mask(config: &Config) -> u32 {
    let _ = config; // arch-specific masks would branch on config here
    crate::config::MAX_CPU_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_constant_returns_stable_offsets() {
        let cfg = Config::default();
        let mut gv = GlobalVars::new(&cfg);
        let a = gv.intern_constant(b"hello\0");
        let b = gv.intern_constant(b"world\0");
        assert_eq!(a, 0);
        assert_eq!(b, 6);
        assert_eq!(gv.ro_size(), 12);
    }

    #[test]
    fn allocate_slot_grows_every_cpu_row() {
        let cfg = Config::default();
        let mut gv = GlobalVars::new(&cfg);
        let slot = gv.allocate_slot();
        gv.write_slot(3, slot, 42);
        assert_eq!(gv.read_slot(3, slot), 42);
        assert_eq!(gv.read_slot(5, slot), 0);
    }

    #[test]
    fn masked_cpu_wraps_out_of_range_ids_into_bounds() {
        let cfg = Config::default();
        let gv = GlobalVars::new(&cfg);
        assert_eq!(gv.masked_cpu(crate::config::MAX_CPU_ID + 1), 0);
        assert_eq!(gv.masked_cpu(10), 10);
    }

    #[test]
    fn rw_size_accounts_for_every_cpu_row() {
        let cfg = Config::default();
        let mut gv = GlobalVars::new(&cfg);
        gv.allocate_slot();
        gv.allocate_slot();
        assert_eq!(gv.rw_size(), 2 * SLOT_SIZE * (crate::config::MAX_CPU_ID as usize + 1));
    }
}
