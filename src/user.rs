//! The user catalog the server authenticates against.
//!
//! A [`User`] stores everything the handshake needs: the SRP verifier and
//! salt, the prime group they were computed against, the session types the
//! user may open and an enable flag. Raw passwords never appear here; they
//! exist only transiently inside [`User::create`].
//!
//! A [`UserList`] is an ordered catalog keyed by the case-folded name. The
//! [`SharedUserList`] handle lets the management side swap a new list in
//! atomically while in-flight handshakes keep the snapshot they captured at
//! start.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use bitflags::bitflags;
use rand::{thread_rng, RngCore};

use crate::error::UserError;
use crate::primes::SrpGroup;
use crate::proto;
use crate::srp;
use crate::username::Username;

/// Salt length for newly created records, in bytes.
pub const SALT_LENGTH: usize = 32;

/// Longest accepted password, in characters.
pub const MAX_PASSWORD_LENGTH: usize = 64;

/// Shortest password the safety check accepts, in characters.
pub const SAFE_PASSWORD_LENGTH: usize = 8;

/// The kinds of session a peer can negotiate.
///
/// The discriminants are single bits so a set of allowed types is a plain
/// bitmask, both in [`User::sessions`] and on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionType {
    /// Full desktop control.
    DesktopManage,
    /// View-only desktop access.
    DesktopView,
    /// File transfer.
    FileTransfer,
    /// Router administration.
    RouterManager,
    /// A peer authorized to relay through the router.
    RouterAuthorizedPeer,
}

impl SessionType {
    /// Every known session type.
    pub const ALL: u32 = 0x1f;

    /// This type's bit in a session mask.
    pub const fn bit(self) -> u32 {
        match self {
            SessionType::DesktopManage => 0x01,
            SessionType::DesktopView => 0x02,
            SessionType::FileTransfer => 0x04,
            SessionType::RouterManager => 0x08,
            SessionType::RouterAuthorizedPeer => 0x10,
        }
    }

    /// The session type for a mask containing exactly this bit.
    pub const fn from_bit(bit: u32) -> Option<Self> {
        match bit {
            0x01 => Some(SessionType::DesktopManage),
            0x02 => Some(SessionType::DesktopView),
            0x04 => Some(SessionType::FileTransfer),
            0x08 => Some(SessionType::RouterManager),
            0x10 => Some(SessionType::RouterAuthorizedPeer),
            _ => None,
        }
    }
}

bitflags! {
    /// Per-user flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UserFlags: u32 {
        /// A disabled user never authenticates, even with correct
        /// credentials.
        const ENABLED = 0x01;
    }
}

/// Valid means storable: non-empty and at most [`MAX_PASSWORD_LENGTH`]
/// characters. Authentication never re-checks this.
pub fn is_valid_password(password: &str) -> bool {
    let length = password.chars().count();
    length > 0 && length <= MAX_PASSWORD_LENGTH
}

/// Advisory strength check used at creation time: at least
/// [`SAFE_PASSWORD_LENGTH`] characters with a lowercase letter, an uppercase
/// letter and a digit.
pub fn is_safe_password(password: &str) -> bool {
    password.chars().count() >= SAFE_PASSWORD_LENGTH
        && password.chars().any(char::is_lowercase)
        && password.chars().any(char::is_uppercase)
        && password.chars().any(|c| c.is_ascii_digit())
}

/// One record of the user catalog.
#[derive(Debug, Clone)]
pub struct User {
    /// The name the record is found under, case-insensitively.
    pub name: Username,
    /// The prime group the verifier was computed against.
    pub group: SrpGroup,
    /// Random salt fed into the `x` computation.
    pub salt: Vec<u8>,
    /// `v = g^x mod N`, big-endian, padded to the group width.
    pub verifier: Vec<u8>,
    /// Bitmask of allowed [`SessionType`] bits.
    pub sessions: u32,
    /// See [`UserFlags`].
    pub flags: UserFlags,
}

impl User {
    /// Builds a record from a name and password: fresh random salt, verifier
    /// computed against the default group. The password is only read, never
    /// stored.
    ///
    /// New records are enabled and allowed no session types; the caller
    /// grants sessions explicitly.
    ///
    /// # Errors
    ///
    /// If the password fails the validity rules.
    pub fn create(name: Username, password: &str) -> Result<Self, UserError> {
        if !is_valid_password(password) {
            return Err(UserError::InvalidPassword);
        }

        let group = SrpGroup::default();

        let mut salt = vec![0_u8; SALT_LENGTH];
        thread_rng().fill_bytes(&mut salt);

        let x = srp::calculate_x(&name, password, &salt);
        let verifier = srp::calculate_verifier(group, &x).to_padded_bytes_be(group.byte_width());

        Ok(Self {
            name,
            group,
            salt,
            verifier,
            sessions: 0,
            flags: UserFlags::ENABLED,
        })
    }

    /// Disabled users fail authentication exactly like unknown ones.
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(UserFlags::ENABLED)
    }

    fn to_entry(&self) -> proto::UserEntry {
        proto::UserEntry {
            name: self.name.as_str().to_owned(),
            salt: self.salt.clone(),
            verifier: self.verifier.clone(),
            group: self.group.wire_id(),
            sessions: self.sessions,
            flags: self.flags.bits(),
        }
    }

    fn from_entry(entry: proto::UserEntry) -> Result<Self, UserError> {
        let invalid = || UserError::InvalidRecord(entry.name.clone());

        let name = Username::new(entry.name.as_str()).map_err(|_| invalid())?;
        let group = SrpGroup::from_wire_id(entry.group).ok_or_else(invalid)?;
        if entry.salt.is_empty() || entry.verifier.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            name,
            group,
            salt: entry.salt,
            verifier: entry.verifier,
            sessions: entry.sessions,
            flags: UserFlags::from_bits_truncate(entry.flags),
        })
    }
}

/// Ordered catalog of users, keyed by the case-folded name.
#[derive(Debug, Default, Clone)]
pub struct UserList {
    users: BTreeMap<String, User>,
}

impl UserList {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive lookup.
    pub fn find(&self, name: &str) -> Option<&User> {
        self.users.get(&name.to_ascii_lowercase())
    }

    /// Adds a record.
    ///
    /// # Errors
    ///
    /// [`UserError::Duplicate`] if a user with the same folded name exists.
    pub fn add(&mut self, user: User) -> Result<(), UserError> {
        let key = user.name.key();
        if self.users.contains_key(&key) {
            return Err(UserError::Duplicate);
        }

        self.users.insert(key, user);
        Ok(())
    }

    /// Replaces the record with the same folded name.
    ///
    /// # Errors
    ///
    /// [`UserError::UnknownUser`] if no such record exists.
    pub fn update(&mut self, user: User) -> Result<(), UserError> {
        let key = user.name.key();
        if !self.users.contains_key(&key) {
            return Err(UserError::UnknownUser);
        }

        self.users.insert(key, user);
        Ok(())
    }

    /// Removes and returns the record with this name, if any.
    pub fn remove(&mut self, name: &str) -> Option<User> {
        self.users.remove(&name.to_ascii_lowercase())
    }

    /// Names in their original spelling, ordered by folded name.
    pub fn names(&self) -> Vec<&str> {
        self.users.values().map(|u| u.name.as_str()).collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the catalog holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Records in folded-name order.
    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Decodes the user database file.
    ///
    /// # Errors
    ///
    /// If the bytes do not decode, a record is unusable, or two records
    /// collide under case folding.
    pub fn from_bytes(buffer: &[u8]) -> Result<Self, UserError> {
        let database = <proto::UserDatabase as prost::Message>::decode(buffer)?;

        let mut list = Self::new();
        for entry in database.users {
            list.add(User::from_entry(entry)?)?;
        }
        Ok(list)
    }

    /// Encodes the list the way the management side persists it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let database = proto::UserDatabase {
            users: self.users.values().map(User::to_entry).collect(),
        };
        proto::encode(&database)
    }
}

/// Atomically swappable handle to a [`UserList`].
///
/// Cheap to clone; every clone sees the same list. An authenticator calls
/// [`snapshot`](SharedUserList::snapshot) once at start and keeps using that
/// snapshot, so a concurrent [`swap`](SharedUserList::swap) never affects a
/// handshake already in flight.
#[derive(Debug, Clone)]
pub struct SharedUserList {
    inner: Arc<RwLock<Arc<UserList>>>,
}

impl SharedUserList {
    /// Wraps a list for sharing.
    pub fn new(list: UserList) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(list))),
        }
    }

    /// Replaces the list for all future snapshots.
    pub fn swap(&self, list: UserList) {
        let mut guard = self.inner.write().expect("user list lock poisoned");
        *guard = Arc::new(list);
    }

    /// The current list. Holders keep it alive across swaps.
    pub fn snapshot(&self) -> Arc<UserList> {
        self.inner.read().expect("user list lock poisoned").clone()
    }
}

impl Default for SharedUserList {
    fn default() -> Self {
        Self::new(UserList::new())
    }
}
