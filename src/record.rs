//! Plain data types passed across the client facade.

/// A `(key, value, db, expire)` tuple accepted by `set_bulk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub db: u16,
    pub expire: i64,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, db: u16, expire: i64) -> Self {
        Record {
            key: key.into(),
            value: value.into(),
            db,
            expire,
        }
    }
}

/// A `(key, db)` tuple accepted by `get_bulk` and `remove_bulk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetItem {
    pub key: Vec<u8>,
    pub db: u16,
}

impl GetItem {
    pub fn new(key: impl Into<Vec<u8>>, db: u16) -> Self {
        GetItem {
            key: key.into(),
            db,
        }
    }
}

/// A `(key, value, db, expire)` tuple returned by `get_bulk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub db: u16,
    pub expire: i64,
}

/// A `(key, value)` tuple, the shape `play_script` speaks (no db, no expire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl ScriptRecord {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        ScriptRecord {
            key: key.into(),
            value: value.into(),
        }
    }
}
