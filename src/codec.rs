//! JSON codec for typed payload boundaries.
//!
//! Every payload crosses the engine as an opaque string; typed APIs wrap the
//! string surface with this codec so orchestrations and activities can work
//! with concrete serde types.

use serde::de::DeserializeOwned;
use serde::Serialize;

pub trait Codec {
    fn encode<T: Serialize>(value: &T) -> Result<String, String>;
    fn decode<T: DeserializeOwned>(s: &str) -> Result<T, String>;
}

pub struct Json;

impl Codec for Json {
    fn encode<T: Serialize>(value: &T) -> Result<String, String> {
        serde_json::to_string(value).map_err(|e| format!("encode: {e}"))
    }

    fn decode<T: DeserializeOwned>(s: &str) -> Result<T, String> {
        serde_json::from_str(s).map_err(|e| format!("decode: {e}"))
    }
}
