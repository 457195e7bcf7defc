use std::io;

use serde::Serialize;

use super::Source;

/// `application/json` body serialized from a [`serde_json::Value`] or any
/// `Serialize` type.
#[derive(Debug)]
pub struct JsonSource {
    data: Vec<u8>,
    pos: usize,
}

impl JsonSource {
    pub fn new(value: &serde_json::Value) -> Self {
        // Serializing a Value cannot fail.
        JsonSource {
            data: value.to_string().into_bytes(),
            pos: 0,
        }
    }

    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(JsonSource {
            data: serde_json::to_vec(value)?,
            pos: 0,
        })
    }
}

impl Source for JsonSource {
    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn reset(&mut self) -> io::Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        Ok(super::copy_some(&self.data, &mut self.pos, buf))
    }

    fn default_content_type(&self) -> &str {
        "application/json"
    }
}

#[cfg(test)]
mod test {
    use super::super::test::drain;
    use super::*;
    use serde_json::json;

    #[test]
    fn value_body() {
        let mut s = JsonSource::new(&json!({"authenticated": true, "user": "martin"}));
        let body = drain(&mut s, 3);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["authenticated"], json!(true));
        assert_eq!(s.default_content_type(), "application/json");
        assert_eq!(s.size(), Some(body.len() as u64));
    }

    #[test]
    fn serialize_body() {
        #[derive(serde::Serialize)]
        struct Payload {
            thing: String,
        }
        let mut s = JsonSource::from_serialize(&Payload {
            thing: "yo".into(),
        })
        .unwrap();
        assert_eq!(drain(&mut s, 64), br#"{"thing":"yo"}"#);
    }
}
