//! Logical Databases
//!
//! A [`Db`] pairs two hash tables: the keyspace (key → value object) and the
//! expiration index (key → absolute expiry time in Unix milliseconds).
//!
//! Expiration is lazy. An expired key stays in both tables until something
//! touches it; every read path first calls [`Db::expire_if_needed`], which
//! deletes the key once `now > when`. There is no background sweep.

use crate::storage::dict::{BytesKey, Dict};
use crate::storage::object::RObj;
use bytes::Bytes;
use tracing::trace;

/// Key → value table.
pub type Keyspace = Dict<Bytes, RObj, BytesKey>;

/// Key → absolute expiry (Unix ms) table.
pub type Expires = Dict<Bytes, i64, BytesKey>;

/// Counters reported by the housekeeping cron and `INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbStats {
    pub keys: usize,
    pub volatile: usize,
    pub slots: usize,
}

#[derive(Debug)]
pub struct Db {
    id: usize,
    dict: Keyspace,
    expires: Expires,
}

impl Db {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            dict: Dict::new(BytesKey),
            expires: Dict::new(BytesKey),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Deletes `key` if its expiration time has passed.
    ///
    /// Returns `true` if the key was expired and removed.
    pub fn expire_if_needed(&mut self, key: &Bytes, now_ms: i64) -> bool {
        match self.expires.get(key) {
            None => false,
            Some(&when) if now_ms <= when => false,
            Some(_) => {
                self.expires.delete(key);
                self.dict.delete(key);
                trace!(db = self.id, key = ?key, "Lazily expired key");
                true
            }
        }
    }

    /// Looks up a key for reading, honouring expiration.
    pub fn lookup_read(&mut self, key: &Bytes, now_ms: i64) -> Option<RObj> {
        self.expire_if_needed(key, now_ms);
        self.dict.get(key).cloned()
    }

    /// Looks up a key about to be modified, honouring expiration.
    pub fn lookup_write(&mut self, key: &Bytes, now_ms: i64) -> Option<RObj> {
        self.lookup_read(key, now_ms)
    }

    /// Inserts `key` only if it is absent. Returns `false` if it existed.
    pub fn add(&mut self, key: Bytes, value: RObj) -> bool {
        self.dict.add(key, value).is_ok()
    }

    /// Inserts or overwrites `key`, dropping any expiration it had.
    pub fn set(&mut self, key: Bytes, value: RObj) {
        self.expires.delete(&key);
        self.dict.replace(key, value);
    }

    /// Removes `key` from the keyspace and the expiration index.
    ///
    /// Returns `true` if the key existed.
    pub fn delete(&mut self, key: &Bytes) -> bool {
        self.expires.delete(key);
        self.dict.delete(key)
    }

    pub fn exists(&self, key: &Bytes) -> bool {
        self.dict.contains_key(key)
    }

    /// Attaches an absolute expiration time to `key`.
    ///
    /// A key cannot carry two expirations: if one is already set this
    /// returns `false` and leaves it untouched.
    pub fn set_expire(&mut self, key: Bytes, when_ms: i64) -> bool {
        self.expires.add(key, when_ms).is_ok()
    }

    pub fn get_expire(&self, key: &Bytes) -> Option<i64> {
        self.expires.get(key).copied()
    }

    /// Removes the expiration of `key`. Returns `true` if it had one.
    pub fn remove_expire(&mut self, key: &Bytes) -> bool {
        self.expires.delete(key)
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    /// Removes every key. Returns how many there were.
    pub fn flush(&mut self) -> usize {
        let removed = self.dict.len();
        self.dict.clear();
        self.expires.clear();
        removed
    }

    pub fn stats(&self) -> DbStats {
        DbStats {
            keys: self.dict.len(),
            volatile: self.expires.len(),
            slots: self.dict.slots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::object::Object;

    fn k(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_add_and_lookup() {
        let mut db = Db::new(0);
        assert!(db.add(k("name"), Object::string("quill")));
        assert!(!db.add(k("name"), Object::string("other")));

        let value = db.lookup_read(&k("name"), 0).unwrap();
        assert_eq!(value.to_bytes(), Bytes::from("quill"));
        assert!(db.lookup_read(&k("missing"), 0).is_none());
    }

    #[test]
    fn test_set_overwrites_and_clears_expire() {
        let mut db = Db::new(0);
        db.set(k("a"), Object::string("1"));
        assert!(db.set_expire(k("a"), 5_000));
        db.set(k("a"), Object::string("2"));

        assert_eq!(db.get_expire(&k("a")), None);
        assert_eq!(db.lookup_read(&k("a"), 10_000).unwrap().to_bytes(), Bytes::from("2"));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_lazy_expiration() {
        let mut db = Db::new(0);
        db.add(k("session"), Object::string("token"));
        assert!(db.set_expire(k("session"), 1_000));

        // Still visible up to and including the expiry instant.
        assert!(db.lookup_read(&k("session"), 1_000).is_some());
        assert_eq!(db.stats().volatile, 1);

        assert!(db.lookup_read(&k("session"), 1_001).is_none());
        assert_eq!(db.len(), 0);
        assert_eq!(db.stats().volatile, 0);
    }

    #[test]
    fn test_expired_key_stays_until_touched() {
        let mut db = Db::new(0);
        db.add(k("a"), Object::string("x"));
        db.set_expire(k("a"), 10);

        // Nothing sweeps it.
        assert_eq!(db.len(), 1);
        assert!(db.expire_if_needed(&k("a"), 11));
        assert!(!db.expire_if_needed(&k("a"), 12));
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn test_second_expire_is_rejected() {
        let mut db = Db::new(0);
        db.add(k("a"), Object::string("x"));
        assert!(db.set_expire(k("a"), 100));
        assert!(!db.set_expire(k("a"), 200));
        assert_eq!(db.get_expire(&k("a")), Some(100));

        assert!(db.remove_expire(&k("a")));
        assert!(db.set_expire(k("a"), 200));
        assert_eq!(db.get_expire(&k("a")), Some(200));
    }

    #[test]
    fn test_delete_removes_expire() {
        let mut db = Db::new(0);
        db.add(k("a"), Object::string("x"));
        db.set_expire(k("a"), 100);
        assert!(db.delete(&k("a")));
        assert!(!db.delete(&k("a")));
        assert_eq!(db.get_expire(&k("a")), None);
    }

    #[test]
    fn test_flush() {
        let mut db = Db::new(3);
        for i in 0..10 {
            db.add(k(&format!("k{}", i)), Object::string("v"));
        }
        db.set_expire(k("k1"), 1);
        assert_eq!(db.flush(), 10);
        assert!(db.is_empty());
        assert_eq!(db.stats(), DbStats { keys: 0, volatile: 0, slots: 0 });
        assert_eq!(db.id(), 3);
    }
}
