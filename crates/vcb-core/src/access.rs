//! Access gate: owner / admin / plain-user roles over a persisted allow-list.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex as StdMutex,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{domain::UserId, errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    PlainUser,
    Unauthorized,
}

impl Role {
    pub fn is_authorized(self) -> bool {
        !matches!(self, Role::Unauthorized)
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::PlainUser => "user",
            Role::Unauthorized => "unauthorized",
        }
    }

    /// Parse the role argument of `/grant`.
    pub fn parse_grantable(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "user" | "plain" | "member" => Some(Role::PlainUser),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// One persisted allow-list entry. The owner is never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub identity: UserId,
    pub role: Role,
}

/// Persistence port for the allow-list. Treated as synchronous and authoritative.
pub trait AccessStore: Send + Sync {
    fn lookup(&self, identity: UserId) -> Result<Option<Role>>;
    fn grant(&self, identity: UserId, role: Role) -> Result<()>;
    /// Returns whether a record was removed.
    fn revoke(&self, identity: UserId) -> Result<bool>;
    fn list(&self) -> Result<Vec<AccessRecord>>;
}

fn poisoned() -> Error {
    Error::Storage("access store lock poisoned".to_string())
}

/// In-memory store (tests, ephemeral deployments).
#[derive(Debug, Default)]
pub struct MemoryAccessStore {
    records: StdMutex<BTreeMap<UserId, Role>>,
}

impl AccessStore for MemoryAccessStore {
    fn lookup(&self, identity: UserId) -> Result<Option<Role>> {
        let map = self.records.lock().map_err(|_| poisoned())?;
        Ok(map.get(&identity).copied())
    }

    fn grant(&self, identity: UserId, role: Role) -> Result<()> {
        let mut map = self.records.lock().map_err(|_| poisoned())?;
        map.insert(identity, role);
        Ok(())
    }

    fn revoke(&self, identity: UserId) -> Result<bool> {
        let mut map = self.records.lock().map_err(|_| poisoned())?;
        Ok(map.remove(&identity).is_some())
    }

    fn list(&self) -> Result<Vec<AccessRecord>> {
        let map = self.records.lock().map_err(|_| poisoned())?;
        Ok(map
            .iter()
            .map(|(identity, role)| AccessRecord {
                identity: *identity,
                role: *role,
            })
            .collect())
    }
}

/// JSON file store: loaded once at construction, flushed after every write.
#[derive(Debug)]
pub struct JsonFileAccessStore {
    path: PathBuf,
    records: StdMutex<BTreeMap<UserId, Role>>,
}

impl JsonFileAccessStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = load_records(&path)?;
        info!(count = records.len(), path = %path.display(), "Loaded access records");
        Ok(Self {
            path,
            records: StdMutex::new(records),
        })
    }

    fn flush(&self, map: &BTreeMap<UserId, Role>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::Storage(format!("create access dir: {e}")))?;
            }
        }
        let records: Vec<AccessRecord> = map
            .iter()
            .map(|(identity, role)| AccessRecord {
                identity: *identity,
                role: *role,
            })
            .collect();
        let json = serde_json::to_string_pretty(&records)?;

        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| Error::Storage(format!("write access file: {e}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Storage(format!("replace access file: {e}")))?;
        debug!(count = records.len(), path = %self.path.display(), "Saved access records");
        Ok(())
    }
}

fn load_records(path: &Path) -> Result<BTreeMap<UserId, Role>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let txt =
        fs::read_to_string(path).map_err(|e| Error::Storage(format!("read access file: {e}")))?;
    if txt.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let records: Vec<AccessRecord> = serde_json::from_str(&txt)?;
    Ok(records
        .into_iter()
        .filter(|r| matches!(r.role, Role::Admin | Role::PlainUser))
        .map(|r| (r.identity, r.role))
        .collect())
}

impl AccessStore for JsonFileAccessStore {
    fn lookup(&self, identity: UserId) -> Result<Option<Role>> {
        let map = self.records.lock().map_err(|_| poisoned())?;
        Ok(map.get(&identity).copied())
    }

    fn grant(&self, identity: UserId, role: Role) -> Result<()> {
        let mut map = self.records.lock().map_err(|_| poisoned())?;
        let previous = map.insert(identity, role);
        if let Err(e) = self.flush(&map) {
            match previous {
                Some(r) => map.insert(identity, r),
                None => map.remove(&identity),
            };
            return Err(e);
        }
        Ok(())
    }

    fn revoke(&self, identity: UserId) -> Result<bool> {
        let mut map = self.records.lock().map_err(|_| poisoned())?;
        let Some(previous) = map.remove(&identity) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&map) {
            map.insert(identity, previous);
            return Err(e);
        }
        Ok(true)
    }

    fn list(&self) -> Result<Vec<AccessRecord>> {
        let map = self.records.lock().map_err(|_| poisoned())?;
        Ok(map
            .iter()
            .map(|(identity, role)| AccessRecord {
                identity: *identity,
                role: *role,
            })
            .collect())
    }
}

/// Single gate every inbound event passes through.
pub struct AccessGate {
    owner: UserId,
    static_users: Vec<UserId>,
    secret_digest: Option<[u8; 32]>,
    store: Arc<dyn AccessStore>,
    writer: Mutex<()>,
}

impl AccessGate {
    pub fn new(
        owner: UserId,
        static_users: Vec<UserId>,
        shared_secret: Option<&str>,
        store: Arc<dyn AccessStore>,
    ) -> Self {
        Self {
            owner,
            static_users,
            secret_digest: shared_secret
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(digest),
            store,
            writer: Mutex::new(()),
        }
    }

    pub fn role_of(&self, identity: UserId) -> Result<Role> {
        if identity == self.owner {
            return Ok(Role::Owner);
        }
        if let Some(role) = self.store.lookup(identity)? {
            return Ok(role);
        }
        if self.static_users.contains(&identity) {
            return Ok(Role::PlainUser);
        }
        Ok(Role::Unauthorized)
    }

    pub async fn grant(&self, identity: UserId, role: Role, requested_by: UserId) -> Result<()> {
        let _w = self.writer.lock().await;

        let requester = self.role_of(requested_by)?;
        let allowed = match role {
            Role::Admin => requester == Role::Owner,
            Role::PlainUser => matches!(requester, Role::Owner | Role::Admin),
            Role::Owner | Role::Unauthorized => false,
        };
        if !allowed {
            warn!(%identity, %requested_by, ?role, "Grant denied");
            return Err(Error::PermissionDenied);
        }
        if identity == self.owner {
            return Err(Error::OwnerProtected);
        }
        // Admins cannot demote other admins by re-granting them as users.
        if requester == Role::Admin && self.store.lookup(identity)? == Some(Role::Admin) {
            return Err(Error::PermissionDenied);
        }

        self.store.grant(identity, role)?;
        info!(%identity, %requested_by, role = role.label(), "Access granted");
        Ok(())
    }

    /// Remove an identity's stored role. Returns whether anything was removed.
    pub async fn revoke(&self, identity: UserId, requested_by: UserId) -> Result<bool> {
        let _w = self.writer.lock().await;

        let requester = self.role_of(requested_by)?;
        if !matches!(requester, Role::Owner | Role::Admin) {
            warn!(%identity, %requested_by, "Revoke denied");
            return Err(Error::PermissionDenied);
        }
        if identity == self.owner {
            warn!(%requested_by, "Attempt to revoke the owner");
            return Err(Error::OwnerProtected);
        }
        if requester == Role::Admin && self.store.lookup(identity)? == Some(Role::Admin) {
            return Err(Error::PermissionDenied);
        }

        let removed = self.store.revoke(identity)?;
        info!(%identity, %requested_by, removed, "Access revoked");
        Ok(removed)
    }

    /// Self-enrolment with the shared secret. Grants PlainUser to unknown identities.
    pub async fn redeem_secret(&self, identity: UserId, secret: &str) -> Result<Role> {
        let _w = self.writer.lock().await;

        let Some(expected) = &self.secret_digest else {
            return Err(Error::PermissionDenied);
        };
        if digest(secret.trim()) != *expected {
            warn!(%identity, "Wrong access secret");
            return Err(Error::PermissionDenied);
        }

        let current = self.role_of(identity)?;
        if current.is_authorized() {
            return Ok(current);
        }
        self.store.grant(identity, Role::PlainUser)?;
        info!(%identity, "Access granted via shared secret");
        Ok(Role::PlainUser)
    }

    /// Owner first, then stored records, then static allow-list entries.
    pub fn list(&self) -> Result<Vec<AccessRecord>> {
        let mut out = vec![AccessRecord {
            identity: self.owner,
            role: Role::Owner,
        }];
        let stored = self.store.list()?;
        out.extend(stored.iter().copied().filter(|r| r.identity != self.owner));
        for id in &self.static_users {
            if *id != self.owner && !stored.iter().any(|r| r.identity == *id) {
                out.push(AccessRecord {
                    identity: *id,
                    role: Role::PlainUser,
                });
            }
        }
        Ok(out)
    }
}

fn digest(s: &str) -> [u8; 32] {
    Sha256::digest(s.as_bytes()).into()
}
