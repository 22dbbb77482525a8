//! Map storage: the runtime-side backing store for every `@name[key] = ...`
//! declaration a probe compiles against.
//!
//! Grounded directly on the teacher's `maps.rs`: a Vec-based per-map
//! storage behind a single `Mutex`-guarded registry, indexed by small
//! integer id the same way the teacher's `create`/`lookup_elem`/
//! `update_elem`/`delete_elem` free functions work. Generalized from the
//! teacher's no_std/`alloc`/`spin` hypervisor-module context to a regular
//! userspace `std` binary (this crate compiles a script and then runs a
//! dispatcher loop on the host, not inside a kernel module), and extended
//! with per-CPU storage and the aggregation semantics `count()`/`sum()`/
//! `min()`/`max()`/`avg()`/`hist()`/`lhist()` need.

use crate::ast::map_info::BpfMapType;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// Map definition for creating new maps.
#[derive(Debug, Clone)]
pub struct MapDef {
    pub map_type: BpfMapType,
    pub key_size: u32,
    pub value_size: u32,
    pub max_entries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    NotFound,
    KeyNotFound,
    NoSpace,
    InvalidArgument,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "map not found"),
            Self::KeyNotFound => write!(f, "key not found"),
            Self::NoSpace => write!(f, "map is full"),
            Self::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

impl std::error::Error for Error {}

/// An aggregation accumulator for maps declared with `count()`/`sum()`/
/// `min()`/`max()`/`avg()`, tracked alongside the raw last-written value so
/// `avg()` can divide without a second map.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregate {
    pub count: u64,
    pub sum: i64,
    pub min: i64,
    pub max: i64,
}

impl Aggregate {
    pub fn record(&mut self, value: i64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn avg(&self) -> i64 {
        if self.count == 0 {
            0
        } else {
            self.sum / self.count as i64
        }
    }
}

/// Backing store for one declared map. Per-CPU map types keep one value
/// per CPU slot rather than one shared value, matching the kernel's
/// `BPF_MAP_TYPE_PERCPU_*` semantics; `read_aggregated` folds them down to
/// a single value the way `bpftrace`'s map printer does.
struct MapStorage {
    def: MapDef,
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    percpu_data: Vec<BTreeMap<Vec<u8>, Vec<u8>>>,
    aggregates: BTreeMap<Vec<u8>, Aggregate>,
}

/// Number of per-CPU slots carried by a per-CPU map; matches
/// `config::MAX_CPU_ID + 1` without requiring storage to depend on config.
const PERCPU_SLOTS: usize = 256;

fn is_percpu(map_type: BpfMapType) -> bool {
    matches!(map_type, BpfMapType::PerCpuHash | BpfMapType::LruPerCpuHash | BpfMapType::PerCpuArray)
}

fn is_lru(map_type: BpfMapType) -> bool {
    matches!(map_type, BpfMapType::LruHash | BpfMapType::LruPerCpuHash)
}

impl MapStorage {
    fn new(def: MapDef) -> Self {
        let percpu_data = if is_percpu(def.map_type) { vec![BTreeMap::new(); PERCPU_SLOTS] } else { Vec::new() };
        Self { def, data: BTreeMap::new(), percpu_data, aggregates: BTreeMap::new() }
    }

    fn lookup(&self, key: &[u8], cpu: u32) -> Option<Vec<u8>> {
        if is_percpu(self.def.map_type) {
            self.percpu_data.get(cpu as usize % PERCPU_SLOTS)?.get(key).cloned()
        } else {
            self.data.get(key).cloned()
        }
    }

    fn update(&mut self, key: &[u8], value: &[u8], cpu: u32, _flags: u32) -> Result<(), Error> {
        if key.len() != self.def.key_size as usize && self.def.key_size != 0 {
            return Err(Error::InvalidArgument);
        }
        if value.len() != self.def.value_size as usize && self.def.value_size != 0 {
            return Err(Error::InvalidArgument);
        }

        let table = if is_percpu(self.def.map_type) {
            &mut self.percpu_data[cpu as usize % PERCPU_SLOTS]
        } else {
            &mut self.data
        };

        if !table.contains_key(key) && table.len() >= self.def.max_entries as usize && self.def.max_entries > 0 {
            if is_lru(self.def.map_type) {
                if let Some(oldest) = table.keys().next().cloned() {
                    table.remove(&oldest);
                }
            } else {
                return Err(Error::NoSpace);
            }
        }
        table.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8], cpu: u32) -> Result<(), Error> {
        let table = if is_percpu(self.def.map_type) {
            &mut self.percpu_data[cpu as usize % PERCPU_SLOTS]
        } else {
            &mut self.data
        };
        table.remove(key).map(|_| ()).ok_or(Error::KeyNotFound)
    }

    /// Fold every per-CPU slot's value for `key` into one aggregate, the
    /// way a per-CPU map is summed for display (`bpftrace` sums counts and
    /// sums/min/maxes numeric aggregations across CPUs the same way).
    fn read_aggregated(&self, key: &[u8]) -> Option<i64> {
        if is_percpu(self.def.map_type) {
            let mut total = 0i64;
            let mut any = false;
            for slot in &self.percpu_data {
                if let Some(v) = slot.get(key) {
                    total += decode_i64(v);
                    any = true;
                }
            }
            any.then_some(total)
        } else {
            self.data.get(key).map(|v| decode_i64(v))
        }
    }

    fn record_aggregate(&mut self, key: &[u8], value: i64) {
        self.aggregates.entry(key.to_vec()).or_default().record(value);
    }

    fn keys(&self) -> Vec<Vec<u8>> {
        if is_percpu(self.def.map_type) {
            let mut out: Vec<Vec<u8>> = self.percpu_data.iter().flat_map(|m| m.keys().cloned()).collect();
            out.sort();
            out.dedup();
            out
        } else {
            self.data.keys().cloned().collect()
        }
    }

    fn clear(&mut self) {
        self.data.clear();
        for slot in &mut self.percpu_data {
            slot.clear();
        }
        self.aggregates.clear();
    }
}

fn decode_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    i64::from_le_bytes(buf)
}

static MAP_REGISTRY: Mutex<Vec<Option<MapStorage>>> = Mutex::new(Vec::new());

pub fn create(def: &MapDef) -> Result<u32, Error> {
    let mut registry = MAP_REGISTRY.lock().unwrap();
    let storage = MapStorage::new(def.clone());

    for (i, slot) in registry.iter_mut().enumerate() {
        if slot.is_none() {
            *slot = Some(storage);
            log::debug!("created map {} with type {:?}", i, def.map_type);
            return Ok(i as u32);
        }
    }

    let id = registry.len() as u32;
    log::debug!("created map {} with type {:?}", id, def.map_type);
    registry.push(Some(storage));
    Ok(id)
}

pub fn lookup_elem(map_id: u32, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
    lookup_elem_percpu(map_id, key, 0)
}

pub fn lookup_elem_percpu(map_id: u32, key: &[u8], cpu: u32) -> Result<Option<Vec<u8>>, Error> {
    let registry = MAP_REGISTRY.lock().unwrap();
    let storage = registry.get(map_id as usize).ok_or(Error::NotFound)?.as_ref().ok_or(Error::NotFound)?;
    Ok(storage.lookup(key, cpu))
}

pub fn update_elem(map_id: u32, key: &[u8], value: &[u8], flags: u32) -> Result<(), Error> {
    update_elem_percpu(map_id, key, value, 0, flags)
}

pub fn update_elem_percpu(map_id: u32, key: &[u8], value: &[u8], cpu: u32, flags: u32) -> Result<(), Error> {
    let mut registry = MAP_REGISTRY.lock().unwrap();
    let storage = registry.get_mut(map_id as usize).ok_or(Error::NotFound)?.as_mut().ok_or(Error::NotFound)?;
    storage.update(key, value, cpu, flags)?;
    storage.record_aggregate(key, decode_i64(value));
    Ok(())
}

pub fn delete_elem(map_id: u32, key: &[u8]) -> Result<(), Error> {
    let mut registry = MAP_REGISTRY.lock().unwrap();
    let storage = registry.get_mut(map_id as usize).ok_or(Error::NotFound)?.as_mut().ok_or(Error::NotFound)?;
    storage.delete(key, 0)
}

/// Sum a per-CPU map's slots down to one value per key, or read the plain
/// value for a non-per-CPU map; used by `print_map`/`clear`/`zero`.
pub fn read_aggregated(map_id: u32, key: &[u8]) -> Result<Option<i64>, Error> {
    let registry = MAP_REGISTRY.lock().unwrap();
    let storage = registry.get(map_id as usize).ok_or(Error::NotFound)?.as_ref().ok_or(Error::NotFound)?;
    Ok(storage.read_aggregated(key))
}

pub fn keys(map_id: u32) -> Result<Vec<Vec<u8>>, Error> {
    let registry = MAP_REGISTRY.lock().unwrap();
    let storage = registry.get(map_id as usize).ok_or(Error::NotFound)?.as_ref().ok_or(Error::NotFound)?;
    Ok(storage.keys())
}

pub fn aggregate(map_id: u32, key: &[u8]) -> Result<Option<Aggregate>, Error> {
    let registry = MAP_REGISTRY.lock().unwrap();
    let storage = registry.get(map_id as usize).ok_or(Error::NotFound)?.as_ref().ok_or(Error::NotFound)?;
    Ok(storage.aggregates.get(key).copied())
}

/// `clear()`/`zero()` builtin: drop every entry (clear) without destroying
/// the map's declaration, or reset its contents to implicit zero (zero).
/// Both share the same underlying reset here since this store has no
/// separate "present with value 0" state to preserve.
pub fn clear(map_id: u32) -> Result<(), Error> {
    let mut registry = MAP_REGISTRY.lock().unwrap();
    let storage = registry.get_mut(map_id as usize).ok_or(Error::NotFound)?.as_mut().ok_or(Error::NotFound)?;
    storage.clear();
    Ok(())
}

pub fn count() -> usize {
    MAP_REGISTRY.lock().unwrap().iter().filter(|s| s.is_some()).count()
}

pub fn destroy(map_id: u32) -> Result<(), Error> {
    let mut registry = MAP_REGISTRY.lock().unwrap();
    let slot = registry.get_mut(map_id as usize).ok_or(Error::NotFound)?;
    if slot.is_none() {
        return Err(Error::NotFound);
    }
    *slot = None;
    log::debug!("destroyed map {}", map_id);
    Ok(())
}
