use serde_json::Value as JsonValue;
use sqlx::any::AnyValueRef;
use sqlx::{TypeInfo, Value, ValueRef};

use crate::Error;

/// Convert a value read through the `Any` driver to a JSON value.
///
/// Integers and floats become JSON numbers (non-finite floats become null) and
/// BLOB values are returned as base64-encoded strings since JSON has no native
/// binary type.
pub fn to_json(value: AnyValueRef) -> Result<JsonValue, Error> {
   if value.is_null() {
      return Ok(JsonValue::Null);
   }

   let type_name = value.type_info().name().to_string();
   let value = ValueRef::to_owned(&value);

   let result = match type_name.as_str() {
      "BOOLEAN" => JsonValue::Bool(value.try_decode::<bool>()?),
      "SMALLINT" => JsonValue::from(value.try_decode::<i16>()?),
      "INTEGER" => JsonValue::from(value.try_decode::<i32>()?),
      "BIGINT" => JsonValue::from(value.try_decode::<i64>()?),
      "REAL" => JsonValue::from(f64::from(value.try_decode::<f32>()?)),
      "DOUBLE" => JsonValue::from(value.try_decode::<f64>()?),
      "TEXT" => JsonValue::String(value.try_decode::<String>()?),
      "BLOB" => JsonValue::String(base64_encode(&value.try_decode::<Vec<u8>>()?)),
      "NULL" => JsonValue::Null,
      _ => {
         if let Ok(v) = value.try_decode::<i64>() {
            JsonValue::from(v)
         } else if let Ok(v) = value.try_decode::<f64>() {
            JsonValue::from(v)
         } else if let Ok(v) = value.try_decode::<String>() {
            JsonValue::String(v)
         } else if let Ok(blob) = value.try_decode::<Vec<u8>>() {
            JsonValue::String(base64_encode(&blob))
         } else {
            return Err(Error::UnsupportedDatatype(format!(
               "Unknown type: {}",
               type_name
            )));
         }
      }
   };

   Ok(result)
}

/// Base64 encode binary data for JSON serialization.
fn base64_encode(data: &[u8]) -> String {
   use base64::Engine;
   base64::engine::general_purpose::STANDARD.encode(data)
}
