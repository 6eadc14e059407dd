//! Session mirroring between a short-lived and a durable store.

use edugenius_common::Result;
use tracing::{debug, info};

use crate::store::KeyValueStore;

/// Value of [`SessionField::IsAuthenticated`] for a signed-in user.
const AUTHENTICATED: &str = "true";

/// Fields mirrored between the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionField {
    IsAuthenticated,
    UserEmail,
    UserName,
    UserId,
    UserRole,
    UserAvatar,
}

impl SessionField {
    pub const ALL: [SessionField; 6] = [
        SessionField::IsAuthenticated,
        SessionField::UserEmail,
        SessionField::UserName,
        SessionField::UserId,
        SessionField::UserRole,
        SessionField::UserAvatar,
    ];

    /// Store key for this field.
    pub fn key(&self) -> &'static str {
        match self {
            SessionField::IsAuthenticated => "isAuthenticated",
            SessionField::UserEmail => "userEmail",
            SessionField::UserName => "userName",
            SessionField::UserId => "userId",
            SessionField::UserRole => "userRole",
            SessionField::UserAvatar => "userAvatar",
        }
    }
}

/// Dashboard a user lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Student,
    Teacher,
}

impl UserRole {
    /// Stored value for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(UserRole::Student),
            "teacher" => Some(UserRole::Teacher),
            _ => None,
        }
    }
}

/// The signed-in user as seen by the short-lived store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub email: String,
    pub name: Option<String>,
    pub id: Option<String>,
    pub role: Option<UserRole>,
    pub avatar: Option<String>,
}

/// Mirrors session fields between a short-lived store `S` and a durable
/// store `D`.
#[derive(Debug)]
pub struct SessionMirror<S, D> {
    session: S,
    durable: D,
}

impl<S: KeyValueStore, D: KeyValueStore> SessionMirror<S, D> {
    pub fn new(session: S, durable: D) -> Self {
        Self { session, durable }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn durable(&self) -> &D {
        &self.durable
    }

    pub fn into_parts(self) -> (S, D) {
        (self.session, self.durable)
    }

    /// Copy durable → short-lived if the short-lived store is empty and the
    /// durable one holds a signed-in user. Returns whether anything was copied.
    pub fn restore(&mut self) -> Result<bool> {
        if !self.session.is_empty() || !is_authenticated(&self.durable) {
            return Ok(false);
        }
        for field in SessionField::ALL {
            if let Some(value) = self.durable.get(field.key()) {
                self.session.set(field.key(), &value)?;
            }
        }
        info!("Session restored from durable store");
        Ok(true)
    }

    /// Copy short-lived → durable while the user is signed in. Fields absent
    /// from the short-lived store are removed from the durable one. Returns
    /// whether anything was copied.
    pub fn save(&mut self) -> Result<bool> {
        if !is_authenticated(&self.session) {
            return Ok(false);
        }
        for field in SessionField::ALL {
            match self.session.get(field.key()) {
                Some(value) => self.durable.set(field.key(), &value)?,
                None => self.durable.remove(field.key())?,
            }
        }
        debug!("Session saved to durable store");
        Ok(true)
    }

    /// Sign out: clear both stores.
    pub fn clear(&mut self) -> Result<()> {
        self.session.clear()?;
        self.durable.clear()?;
        info!("Session cleared");
        Ok(())
    }

    /// Record a sign-in in the short-lived store.
    pub fn sign_in(&mut self, user: &SessionUser) -> Result<()> {
        self.session.clear()?;
        self.session
            .set(SessionField::IsAuthenticated.key(), AUTHENTICATED)?;
        self.session.set(SessionField::UserEmail.key(), &user.email)?;
        let optional = [
            (SessionField::UserName, user.name.as_deref()),
            (SessionField::UserId, user.id.as_deref()),
            (SessionField::UserRole, user.role.map(|r| r.as_str())),
            (SessionField::UserAvatar, user.avatar.as_deref()),
        ];
        for (field, value) in optional {
            if let Some(value) = value {
                self.session.set(field.key(), value)?;
            }
        }
        Ok(())
    }

    /// The signed-in user, if the short-lived store holds one.
    pub fn current_user(&self) -> Option<SessionUser> {
        if !is_authenticated(&self.session) {
            return None;
        }
        Some(SessionUser {
            email: self.session.get(SessionField::UserEmail.key())?,
            name: self.session.get(SessionField::UserName.key()),
            id: self.session.get(SessionField::UserId.key()),
            role: self
                .session
                .get(SessionField::UserRole.key())
                .and_then(|r| UserRole::parse(&r)),
            avatar: self.session.get(SessionField::UserAvatar.key()),
        })
    }
}

fn is_authenticated(store: &impl KeyValueStore) -> bool {
    store.get(SessionField::IsAuthenticated.key()).as_deref() == Some(AUTHENTICATED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};

    fn teacher() -> SessionUser {
        SessionUser {
            email: "grace@school.example".to_string(),
            name: Some("Grace".to_string()),
            id: Some("t-42".to_string()),
            role: Some(UserRole::Teacher),
            avatar: None,
        }
    }

    #[test]
    fn test_save_then_restore() {
        let mut mirror = SessionMirror::new(MemoryStore::new(), MemoryStore::new());
        mirror.sign_in(&teacher()).unwrap();
        assert!(mirror.save().unwrap());

        let (_, durable) = mirror.into_parts();
        let mut fresh = SessionMirror::new(MemoryStore::new(), durable);
        assert!(fresh.restore().unwrap());
        assert_eq!(fresh.current_user(), Some(teacher()));
    }

    #[test]
    fn test_save_requires_authenticated_session() {
        let mut mirror = SessionMirror::new(MemoryStore::new(), MemoryStore::new());
        mirror.session_mut().set("userEmail", "x@y.z").unwrap();
        assert!(!mirror.save().unwrap());
        assert!(mirror.durable().is_empty());
    }

    #[test]
    fn test_restore_skips_non_empty_session() {
        let mut durable = MemoryStore::new();
        durable.set("isAuthenticated", "true").unwrap();
        durable.set("userEmail", "old@school.example").unwrap();

        let mut session = MemoryStore::new();
        session.set("userEmail", "new@school.example").unwrap();

        let mut mirror = SessionMirror::new(session, durable);
        assert!(!mirror.restore().unwrap());
        assert_eq!(
            mirror.session().get("userEmail").as_deref(),
            Some("new@school.example")
        );
    }

    #[test]
    fn test_restore_requires_authenticated_durable() {
        let mut durable = MemoryStore::new();
        durable.set("isAuthenticated", "false").unwrap();
        durable.set("userEmail", "old@school.example").unwrap();

        let mut mirror = SessionMirror::new(MemoryStore::new(), durable);
        assert!(!mirror.restore().unwrap());
        assert!(mirror.session().is_empty());
    }

    #[test]
    fn test_save_drops_fields_missing_from_session() {
        let mut mirror = SessionMirror::new(MemoryStore::new(), MemoryStore::new());
        let mut user = teacher();
        user.avatar = Some("https://cdn.example/grace.png".to_string());
        mirror.sign_in(&user).unwrap();
        mirror.save().unwrap();

        mirror.sign_in(&teacher()).unwrap();
        mirror.save().unwrap();
        assert!(mirror.durable().get("userAvatar").is_none());
    }

    #[test]
    fn test_durable_file_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut mirror = SessionMirror::new(MemoryStore::new(), FileStore::open(&path).unwrap());
        mirror.sign_in(&teacher()).unwrap();
        mirror.save().unwrap();
        drop(mirror);

        let mut restarted =
            SessionMirror::new(MemoryStore::new(), FileStore::open(&path).unwrap());
        assert!(restarted.restore().unwrap());
        assert_eq!(
            restarted.current_user().unwrap().role,
            Some(UserRole::Teacher)
        );
    }

    #[test]
    fn test_clear_signs_out_everywhere() {
        let mut mirror = SessionMirror::new(MemoryStore::new(), MemoryStore::new());
        mirror.sign_in(&teacher()).unwrap();
        mirror.save().unwrap();
        mirror.clear().unwrap();

        assert!(mirror.current_user().is_none());
        assert!(mirror.durable().is_empty());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(UserRole::parse("Student"), Some(UserRole::Student));
        assert_eq!(UserRole::parse(" teacher "), Some(UserRole::Teacher));
        assert_eq!(UserRole::parse("admin"), None);
    }

    #[test]
    fn test_sign_in_stores_role_string() {
        let mut mirror = SessionMirror::new(MemoryStore::new(), MemoryStore::new());
        mirror.sign_in(&teacher()).unwrap();
        assert_eq!(mirror.session().get("userRole").as_deref(), Some("teacher"));
        for role in [UserRole::Student, UserRole::Teacher] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
    }
}
