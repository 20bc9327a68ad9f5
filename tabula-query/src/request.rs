use serde_json::{Map, Value};
use tabula_core::{Error, Result};

/// Free-form request parameters as submitted by a client.
pub type QueryParams = Map<String, Value>;

pub const STATEMENT_KEY: &str = "statement";
pub const DATA_SOURCE_KEY: &str = "data_source";
pub const OPTIONS_KEY: &str = "options";
pub const CONTINUATION_KEY: &str = "continuation";

/// The parts of a parameter bag an engine needs, plus the bag itself.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub statement: String,
    pub data_source: String,
    pub options: Map<String, Value>,
    /// Everything the client sent, reserved keys included.
    pub params: QueryParams,
}

impl QueryRequest {
    pub fn from_params(params: &QueryParams) -> Result<Self> {
        let statement = required_str(params, STATEMENT_KEY)?;
        let data_source = required_str(params, DATA_SOURCE_KEY)?;
        let options = match params.get(OPTIONS_KEY) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(options)) => options.clone(),
            Some(_) => {
                return Err(Error::MalformedInput(format!(
                    "\"{}\" must be an object",
                    OPTIONS_KEY
                )))
            }
        };

        Ok(Self {
            statement,
            data_source,
            options,
            params: params.clone(),
        })
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn option_usize(&self, key: &str) -> Option<usize> {
        self.options
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
    }
}

fn required_str(params: &QueryParams, key: &str) -> Result<String> {
    match params.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            Err(Error::MalformedInput(format!("\"{}\" can't be blank", key)))
        }
        Some(_) => Err(Error::MalformedInput(format!("\"{}\" must be a string", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> QueryParams {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_from_params_keeps_extra_keys() {
        let params = params(json!({
            "statement": "sales",
            "data_source": "uploads",
            "options": {"limit": 5, "format": "csv"},
            "request_id": "abc"
        }));
        let request = QueryRequest::from_params(&params).unwrap();
        assert_eq!(request.statement, "sales");
        assert_eq!(request.option_usize("limit"), Some(5));
        assert_eq!(request.option_str("format"), Some("csv"));
        assert_eq!(request.params.get("request_id"), Some(&json!("abc")));
    }

    #[test]
    fn test_missing_statement() {
        let err = QueryRequest::from_params(&params(json!({"data_source": "uploads"}))).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(msg) if msg.contains("statement")));
    }

    #[test]
    fn test_options_must_be_object() {
        let err = QueryRequest::from_params(&params(json!({
            "statement": "x",
            "data_source": "uploads",
            "options": [1]
        })))
        .unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }
}
