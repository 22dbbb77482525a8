//! Attachment bookkeeping: which compiled program is attached at which
//! live attach point.
//!
//! Grounded directly on the teacher's `attach.rs`: a global,
//! `Mutex`-guarded `BTreeMap` from attach-point key to attachment info,
//! generalized from "tracepoint name -> program id/name" to "attach-point
//! key (including kprobe/uprobe/usdt specs) -> program id," since this
//! crate attaches to more than tracepoints.

use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    AlreadyAttached(String),
    NotAttached(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyAttached(key) => write!(f, "'{}' is already attached", key),
            Self::NotAttached(key) => write!(f, "'{}' is not attached", key),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Clone)]
pub struct AttachmentInfo {
    pub program_id: u32,
    pub probe_name: String,
}

static ATTACHMENTS: Mutex<BTreeMap<String, AttachmentInfo>> = Mutex::new(BTreeMap::new());

pub fn attach(key: impl Into<String>, program_id: u32, probe_name: impl Into<String>) -> Result<(), Error> {
    let key = key.into();
    let mut attachments = ATTACHMENTS.lock().unwrap();
    if attachments.contains_key(&key) {
        return Err(Error::AlreadyAttached(key));
    }
    attachments.insert(key, AttachmentInfo { program_id, probe_name: probe_name.into() });
    Ok(())
}

pub fn detach(key: &str) -> Result<AttachmentInfo, Error> {
    ATTACHMENTS.lock().unwrap().remove(key).ok_or_else(|| Error::NotAttached(key.to_string()))
}

pub fn get_attached(key: &str) -> Option<AttachmentInfo> {
    ATTACHMENTS.lock().unwrap().get(key).cloned()
}

pub fn list_attachments() -> Vec<(String, AttachmentInfo)> {
    ATTACHMENTS.lock().unwrap().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

pub fn attachment_count() -> usize {
    ATTACHMENTS.lock().unwrap().len()
}
