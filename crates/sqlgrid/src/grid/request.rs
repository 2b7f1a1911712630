//! HTTP-shaped input and output of a grid render.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method, StatusCode};

use crate::error::{Error, ErrorKind, Result};

/// Authenticated caller, placed in the request extensions by auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub params: BTreeMap<String, String>,
    pub body: Bytes,
    pub principal: Option<Principal>,
}

impl Request {
    pub fn new(method: Method, query: &str) -> Result<Self> {
        Ok(Self {
            method,
            params: parse_query(query)?,
            body: Bytes::new(),
            principal: None,
        })
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn from_http(request: http::Request<Bytes>) -> Result<Self> {
        let principal = request.extensions().get::<Principal>().copied();
        let query = request.uri().query().unwrap_or_default().to_owned();
        let (parts, body) = request.into_parts();
        Ok(Self {
            method: parts.method,
            params: parse_query(&query)?,
            body,
            principal,
        })
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Present and non-empty.
    pub fn has(&self, name: &str) -> bool {
        self.param(name).is_some_and(|v| !v.is_empty())
    }

    /// Integer parameter; `InvalidParam` when it does not parse.
    pub fn int_param(&self, name: &str) -> Result<Option<i64>> {
        match self.param(name).map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                Error::new(ErrorKind::InvalidParam, format!("`{name}` must be an integer"))
            }),
        }
    }

    /// Body as a JSON object; `BodyEmpty` without one.
    pub fn json_body(&self) -> Result<serde_json::Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::new(ErrorKind::BodyEmpty, "request body is empty"));
        }
        let body: serde_json::Value = serde_json::from_slice(&self.body)?;
        if !body.is_object() {
            return Err(Error::new(ErrorKind::JsonInvalid, "request body must be a JSON object"));
        }
        Ok(body)
    }
}

fn parse_query(query: &str) -> Result<BTreeMap<String, String>> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
        .map_err(|e| Error::new(ErrorKind::InvalidParam, e.to_string()))?;
    Ok(pairs.into_iter().collect())
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn json(value: &serde_json::Value) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Self {
            status: StatusCode::OK,
            headers,
            body: Bytes::from(serde_json::to_vec(value)?),
        })
    }

    /// File download named `export.<extension>`.
    pub fn attachment(content_type: &'static str, extension: &str, body: Vec<u8>) -> Result<Self> {
        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"export.{extension}\""))
            .map_err(|e| Error::new(ErrorKind::InvalidParam, e.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(CONTENT_DISPOSITION, disposition);
        Ok(Self {
            status: StatusCode::OK,
            headers,
            body: Bytes::from(body),
        })
    }

    /// 500 carrying only the error kind.
    pub fn error(err: &Error) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers,
            body: Bytes::from_static(err.kind().as_str().as_bytes()),
        }
    }

    pub fn json_body(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn into_http(self) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_and_principal_come_from_http() {
        let mut request = http::Request::builder()
            .method(Method::GET)
            .uri("/users?sort=id%2C-first_name&filter_id=1&limit=5")
            .body(Bytes::new())
            .unwrap();
        request.extensions_mut().insert(Principal { user_id: 9 });

        let request = Request::from_http(request).unwrap();
        assert_eq!(request.param("sort"), Some("id,-first_name"));
        assert_eq!(request.int_param("limit").unwrap(), Some(5));
        assert_eq!(request.int_param("page").unwrap(), None);
        assert_eq!(request.principal, Some(Principal { user_id: 9 }));
    }

    #[test]
    fn bad_params_and_bodies() {
        let request = Request::new(Method::GET, "limit=ten").unwrap();
        assert_eq!(request.int_param("limit").unwrap_err().kind(), ErrorKind::InvalidParam);

        let post = Request::new(Method::POST, "").unwrap();
        assert_eq!(post.json_body().unwrap_err().kind(), ErrorKind::BodyEmpty);
        assert_eq!(post.clone().with_body("[1]").json_body().unwrap_err().kind(), ErrorKind::JsonInvalid);
        assert_eq!(post.clone().with_body("{").json_body().unwrap_err().kind(), ErrorKind::JsonInvalid);
        assert_eq!(post.with_body(r#"{"a": 1}"#).json_body().unwrap()["a"], 1);
    }

    #[test]
    fn error_responses_hide_details() {
        let err = Error::new(ErrorKind::Driver, "SELECT secret FROM vault failed");
        let response = Response::error(&err);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&response.body[..], b"driver error");
    }

    #[test]
    fn attachments_name_the_file() {
        let response = Response::attachment("text/csv", "csv", b"a;b".to_vec()).unwrap();
        let http = response.into_http();
        assert_eq!(http.headers()[CONTENT_DISPOSITION], "attachment; filename=\"export.csv\"");
        assert_eq!(http.headers()[CONTENT_TYPE], "text/csv");
    }
}
