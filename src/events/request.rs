//! Query control requests and their routed event envelope.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle methods carried between services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestMethod {
    Create,
    Next,
    Cancel,
    Close,
    Plan,
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Next => write!(f, "NEXT"),
            Self::Cancel => write!(f, "CANCEL"),
            Self::Close => write!(f, "CLOSE"),
            Self::Plan => write!(f, "PLAN"),
        }
    }
}

/// A control request for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub method: RequestMethod,
    pub query_id: Uuid,
}

impl QueryRequest {
    pub fn create(query_id: Uuid) -> Self {
        Self {
            method: RequestMethod::Create,
            query_id,
        }
    }

    pub fn next(query_id: Uuid) -> Self {
        Self {
            method: RequestMethod::Next,
            query_id,
        }
    }

    pub fn cancel(query_id: Uuid) -> Self {
        Self {
            method: RequestMethod::Cancel,
            query_id,
        }
    }

    pub fn close(query_id: Uuid) -> Self {
        Self {
            method: RequestMethod::Close,
            query_id,
        }
    }

    pub fn plan(query_id: Uuid) -> Self {
        Self {
            method: RequestMethod::Plan,
            query_id,
        }
    }
}

impl fmt::Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.query_id)
    }
}

/// A [`QueryRequest`] routed over the bus.
///
/// `destination` is a wildcard routing pattern, not a point-to-point
/// address; every process matching the pattern receives the event.
/// Subscribers skip events whose `origin_service` is their own id, since
/// those are echoes of their own publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteQueryRequestEvent {
    pub origin_service: String,
    pub destination: String,
    pub request: QueryRequest,
}

impl RemoteQueryRequestEvent {
    pub fn new(
        origin_service: impl Into<String>,
        destination: impl Into<String>,
        request: QueryRequest,
    ) -> Self {
        Self {
            origin_service: origin_service.into(),
            destination: destination.into(),
            request,
        }
    }

    pub fn query_id(&self) -> Uuid {
        self.request.query_id
    }

    pub fn method(&self) -> RequestMethod {
        self.request.method
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&RequestMethod::Create).unwrap();
        assert_eq!(json, "\"CREATE\"");
        let parsed: RequestMethod = serde_json::from_str("\"CANCEL\"").unwrap();
        assert_eq!(parsed, RequestMethod::Cancel);
    }

    #[test]
    fn constructors_set_the_method() {
        let id = Uuid::new_v4();
        assert_eq!(QueryRequest::create(id).method, RequestMethod::Create);
        assert_eq!(QueryRequest::next(id).method, RequestMethod::Next);
        assert_eq!(QueryRequest::cancel(id).method, RequestMethod::Cancel);
        assert_eq!(QueryRequest::close(id).method, RequestMethod::Close);
        assert_eq!(QueryRequest::plan(id).method, RequestMethod::Plan);
    }
}
