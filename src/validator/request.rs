use serde_json::Value;

use crate::error::{Result, ScoutError};
use crate::models::ProxyRecord;

/// Validation request body: `{records: [...], testSites?: [...]}`
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRequest {
    pub records: Vec<ProxyRecord>,
    pub test_sites: Option<Vec<String>>,
}

impl ValidationRequest {
    /// Check the body shape before anything touches the network. A missing
    /// or non-array `records` is rejected outright.
    pub fn from_json(body: Value) -> Result<Self> {
        let Value::Object(mut body) = body else {
            return Err(ScoutError::InvalidRequest(
                "request body must be a JSON object".to_string(),
            ));
        };

        let records = match body.remove("records") {
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    serde_json::from_value::<ProxyRecord>(item).map_err(|e| {
                        ScoutError::InvalidRequest(format!("records[{}] is invalid: {}", i, e))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(ScoutError::InvalidRequest(
                    "records must be an array".to_string(),
                ))
            }
            None => return Err(ScoutError::InvalidRequest("records is required".to_string())),
        };

        let test_sites = match body.remove("testSites") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(site) => Ok(site),
                        other => Err(ScoutError::InvalidRequest(format!(
                            "testSites entries must be strings, got {}",
                            other
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(_) => {
                return Err(ScoutError::InvalidRequest(
                    "testSites must be an array".to_string(),
                ))
            }
        };

        Ok(Self {
            records,
            test_sites,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_records_must_be_array() {
        let err = assert_err!(ValidationRequest::from_json(json!({"records": "not-an-array"})));
        assert!(matches!(err, ScoutError::InvalidRequest(_)));

        assert_err!(ValidationRequest::from_json(json!({})));
        assert_err!(ValidationRequest::from_json(json!([1, 2])));
    }

    #[test]
    fn test_parses_records_and_sites() {
        let request = assert_ok!(ValidationRequest::from_json(json!({
            "records": [
                {"ip": "1.2.3.4", "port": 80, "protocol": "http"},
                {"ip": "5.6.7.8", "port": 1080, "protocol": "socks5", "source": "geonode"}
            ],
            "testSites": ["http://httpbin.org/get"]
        })));
        assert_eq!(request.records.len(), 2);
        assert_eq!(request.records[1].source, "geonode");
        assert_eq!(
            request.test_sites,
            Some(vec!["http://httpbin.org/get".to_string()])
        );
    }

    #[test]
    fn test_rejects_malformed_record() {
        let err = assert_err!(ValidationRequest::from_json(json!({
            "records": [{"ip": "1.2.3.4", "port": "eighty", "protocol": "http"}]
        })));
        assert!(err.to_string().contains("records[0]"));
    }
}
