//! # Hash Records
//!
//! Purpose: Store a caller-defined record as the fields of one hash key and
//! read it back, without runtime type inspection.
//!
//! Each record type states its own field list through [`HashRecord`]. Fields
//! the type does not know are skipped when reading, and a hash that does not
//! exist reads as `ClientError::NotFound`.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::client::KvClient;
use crate::commands::pairs;
use crate::error::{ClientError, ClientResult};

/// Conversion between a record and a flat field/value list.
pub trait HashRecord: Sized {
    /// Fields to write, in order.
    fn to_fields(&self) -> Vec<(String, Vec<u8>)>;

    /// Rebuilds the record from the fields read back.
    fn from_fields(fields: Vec<(String, Vec<u8>)>) -> ClientResult<Self>;
}

/// Parses a field value into `T`.
pub fn parse_field<T: FromStr>(name: &str, raw: &[u8]) -> ClientResult<T> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| ClientError::protocol(format!("field `{}` has an invalid value", name)))
}

impl HashRecord for HashMap<String, Vec<u8>> {
    fn to_fields(&self) -> Vec<(String, Vec<u8>)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn from_fields(fields: Vec<(String, Vec<u8>)>) -> ClientResult<Self> {
        Ok(fields.into_iter().collect())
    }
}

impl HashRecord for BTreeMap<String, String> {
    fn to_fields(&self) -> Vec<(String, Vec<u8>)> {
        self.iter()
            .map(|(k, v)| (k.clone(), v.clone().into_bytes()))
            .collect()
    }

    fn from_fields(fields: Vec<(String, Vec<u8>)>) -> ClientResult<Self> {
        fields
            .into_iter()
            .map(|(name, raw)| {
                let value = parse_field::<String>(&name, &raw)?;
                Ok((name, value))
            })
            .collect()
    }
}

impl KvClient {
    /// Writes every field of `record` into the hash at `key` with HMSET.
    ///
    /// A record without fields writes nothing.
    pub fn hmset_record<R: HashRecord>(&self, key: &str, record: &R) -> ClientResult<()> {
        let fields = record.to_fields();
        if fields.is_empty() {
            return Ok(());
        }

        let mut args: Vec<&[u8]> = Vec::with_capacity(1 + fields.len() * 2);
        args.push(key.as_bytes());
        for (name, value) in &fields {
            args.push(name.as_bytes());
            args.push(value);
        }
        self.send("HMSET", &args)?.into_status().map(drop)
    }

    /// Reads the hash at `key` into a record.
    pub fn hgetall_record<R: HashRecord>(&self, key: &str) -> ClientResult<R> {
        let items = self.send("HGETALL", &[key.as_bytes()])?.into_array()?;
        if items.is_empty() {
            return Err(ClientError::NotFound);
        }
        R::from_fields(pairs(items)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Profile {
        name: String,
        age: u32,
    }

    impl HashRecord for Profile {
        fn to_fields(&self) -> Vec<(String, Vec<u8>)> {
            vec![
                ("name".into(), self.name.clone().into_bytes()),
                ("age".into(), self.age.to_string().into_bytes()),
            ]
        }

        fn from_fields(fields: Vec<(String, Vec<u8>)>) -> ClientResult<Self> {
            let mut profile = Profile {
                name: String::new(),
                age: 0,
            };
            for (name, raw) in fields {
                match name.as_str() {
                    "name" => profile.name = parse_field(&name, &raw)?,
                    "age" => profile.age = parse_field(&name, &raw)?,
                    _ => {}
                }
            }
            Ok(profile)
        }
    }

    #[test]
    fn record_survives_field_list() {
        let profile = Profile {
            name: "ada".into(),
            age: 36,
        };
        let back = Profile::from_fields(profile.to_fields()).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let fields = vec![
            ("nickname".to_string(), b"countess".to_vec()),
            ("age".to_string(), b"36".to_vec()),
        ];
        let profile = Profile::from_fields(fields).unwrap();
        assert_eq!(profile.age, 36);
        assert!(profile.name.is_empty());
    }

    #[test]
    fn bad_field_value_is_protocol_error() {
        let fields = vec![("age".to_string(), b"old".to_vec())];
        match Profile::from_fields(fields) {
            Err(ClientError::Protocol(message)) => {
                assert_eq!(message, "field `age` has an invalid value")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn string_map_rejects_invalid_utf8() {
        let fields = vec![("k".to_string(), vec![0xff, 0xfe])];
        assert!(BTreeMap::<String, String>::from_fields(fields).is_err());
    }
}
