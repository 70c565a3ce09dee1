//! Value codecs
//!
//! The engine stores bytes. A [`ValueCodec`] turns caller types into those
//! bytes and back; [`Collection`] pairs a codec with a database handle.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::engine::Database;
use crate::error::Result;

/// Encoding capability for one value type
pub trait ValueCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// bincode for any serde type
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl<T> ValueCodec<T> for BincodeCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Typed view over a [`Database`]
///
/// All collections share the database's single key space.
pub struct Collection<'db, T, C = BincodeCodec> {
    db: &'db Database,
    codec: C,
    _marker: PhantomData<fn() -> T>,
}

impl<'db, T, C: ValueCodec<T>> Collection<'db, T, C> {
    pub fn new(db: &'db Database, codec: C) -> Self {
        Self {
            db,
            codec,
            _marker: PhantomData,
        }
    }

    pub fn set(&self, key: &str, value: &T) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        self.db.set(key, &bytes)
    }

    pub fn get(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.db.delete(key)
    }
}
