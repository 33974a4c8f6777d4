use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};

use crate::rank::Rank;

pub const ROOM_PERMISSIONS: &str = "roomPermissions";
pub const GLOBAL_ADMINS: &str = "globalAdmins";
pub const ROOM_BANS: &str = "roomBans";

/// Write-through JSON document holding room ranks, global admins and room bans.
///
/// Every mutation rewrites the whole file before the in-memory copy is updated, so a failed
/// write leaves both sides at the previous state. Writes go to a sibling `.tmp` file and are
/// renamed into place; that is only atomic where the filesystem makes rename atomic.
#[derive(Debug)]
pub struct PermissionStore {
    path: PathBuf,
    current: Map<String, Value>,
}

impl PermissionStore {
    /// Loads the document, creating it as `{}` when missing.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let s = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let st = Self {
                    path,
                    current: Map::new(),
                };
                st.update()?;
                return Ok(st);
            }
            Err(e) => {
                return Err(anyhow::anyhow!("failed to read storage file {:?}: {e}", path));
            }
        };

        let v: Value = serde_json::from_str(&s)
            .map_err(|e| anyhow::anyhow!("failed to parse storage file {:?}: {e}", path))?;
        let Value::Object(current) = v else {
            anyhow::bail!("storage file {:?} is not a JSON object", path);
        };
        Ok(Self { path, current })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.current.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.current.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: Value) -> anyhow::Result<&Value> {
        let mut next = self.current.clone();
        next.insert(key.to_string(), value);
        write_doc(&self.path, &next)?;
        self.current = next;
        self.current
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("storage key {key:?} vanished after set"))
    }

    /// Returns whether the key existed. Absent keys don't touch the file.
    pub fn remove(&mut self, key: &str) -> anyhow::Result<bool> {
        if !self.current.contains_key(key) {
            return Ok(false);
        }
        let mut next = self.current.clone();
        next.remove(key);
        write_doc(&self.path, &next)?;
        self.current = next;
        Ok(true)
    }

    /// Flushes the in-memory document unconditionally.
    pub fn update(&self) -> anyhow::Result<()> {
        write_doc(&self.path, &self.current)
    }

    /// Makes sure the three top-level entries exist.
    pub fn ensure_defaults(&mut self) -> anyhow::Result<()> {
        if !self.has(ROOM_PERMISSIONS) {
            self.set(ROOM_PERMISSIONS, Value::Object(Map::new()))?;
        }
        if !self.has(GLOBAL_ADMINS) {
            self.set(GLOBAL_ADMINS, Value::Array(Vec::new()))?;
        }
        if !self.has(ROOM_BANS) {
            self.set(ROOM_BANS, Value::Object(Map::new()))?;
        }
        Ok(())
    }

    pub fn rank(&self, room: &str, participant: &str) -> Rank {
        self.get(ROOM_PERMISSIONS)
            .and_then(|v| v.get(room))
            .and_then(|v| v.get(participant))
            .and_then(Value::as_u64)
            .map(|n| Rank(u8::try_from(n).unwrap_or(u8::MAX)))
            .unwrap_or_default()
    }

    /// Everyone with a stored rank in `room`, highest first.
    pub fn ranks(&self, room: &str) -> Vec<(String, Rank)> {
        let Some(Value::Object(m)) = self.get(ROOM_PERMISSIONS).and_then(|v| v.get(room)) else {
            return Vec::new();
        };
        let mut out = m
            .iter()
            .filter_map(|(id, v)| {
                let n = v.as_u64()?;
                Some((id.clone(), Rank(u8::try_from(n).unwrap_or(u8::MAX))))
            })
            .collect::<Vec<_>>();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn set_rank(&mut self, room: &str, participant: &str, rank: Rank) -> anyhow::Result<()> {
        let mut perms = match self.get(ROOM_PERMISSIONS) {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        };
        let room_map = perms
            .entry(room.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !room_map.is_object() {
            *room_map = Value::Object(Map::new());
        }
        if let Value::Object(m) = room_map {
            m.insert(participant.to_string(), Value::from(rank.level()));
        }
        self.set(ROOM_PERMISSIONS, Value::Object(perms))
            .with_context(|| format!("saving rank for {participant} in {room}"))?;
        Ok(())
    }

    /// Grants `participant` the owner rank in `room` when the room has no permissions yet.
    pub fn seed_room_owner(&mut self, room: &str, participant: &str) -> anyhow::Result<bool> {
        let exists = self
            .get(ROOM_PERMISSIONS)
            .and_then(|v| v.get(room))
            .is_some();
        if exists {
            return Ok(false);
        }
        self.set_rank(room, participant, Rank::OWNER)?;
        Ok(true)
    }

    pub fn is_global_admin(&self, participant: &str) -> bool {
        self.get(GLOBAL_ADMINS)
            .and_then(Value::as_array)
            .is_some_and(|ids| ids.iter().any(|v| v.as_str() == Some(participant)))
    }

    /// Number of stored ban records across all rooms.
    pub fn ban_count(&self) -> usize {
        self.get(ROOM_BANS)
            .and_then(Value::as_object)
            .map(|m| m.values().filter_map(Value::as_array).map(Vec::len).sum())
            .unwrap_or(0)
    }
}

fn write_doc(path: &Path, doc: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("failed to create storage dir {:?}: {e}", parent))?;
        }
    }

    let s = serde_json::to_string_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, s).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn scratch_path(tag: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEQ: AtomicU64 = AtomicU64::new(0);

    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir()
        .join(format!("crownkeeper-{}-{nanos}-{n}", std::process::id()))
        .join(format!("{tag}.json"))
}
