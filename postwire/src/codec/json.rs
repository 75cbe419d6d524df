use serde::{Serialize, de::DeserializeOwned};

use super::Value;
use crate::row::{Decode, DecodeError};

/// Json wrapper, deserialize `json` and `jsonb` columns with [`serde`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> Json<T> {
    /// Serialize into [`Value::Json`].
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        Value::json(&self.0)
    }
}

impl<T: DeserializeOwned> Decode for Json<T> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Json(doc) | Value::Text(doc) => Ok(Json(serde_json::from_str(&doc)?)),
            Value::Null => Err(DecodeError::Null),
            value => Err(DecodeError::Mismatch { expected: "json", found: value.kind_name() }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq, serde::Deserialize, serde::Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn json_wrapper() {
        let Json(point) = Json::<Point>::decode(Value::Json(r#"{"x":1,"y":2}"#.into())).unwrap();
        assert_eq!(point, Point { x: 1, y: 2 });
        assert_eq!(Json(point).to_value().unwrap(), Value::Json(r#"{"x":1,"y":2}"#.into()));
        assert!(Json::<Point>::decode(Value::Json("[]".into())).is_err());
    }
}
