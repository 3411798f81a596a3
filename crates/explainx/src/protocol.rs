//! Request/response contract between UI contexts and the coordinator.
//!
//! A caller sends one [`Request`] and receives exactly one [`Response`]:
//! either [`Response::Success`] carrying a [`Reply`] or [`Response::Failure`]
//! carrying a [`Failure`]. There is no streaming and no partial reply.
//!
//! On the wire (JSON) requests are tagged by `kind`:
//!
//! ```json
//! {"kind": "generateSummary", "content": "page text..."}
//! {"kind": "deleteSummary", "id": "1736870400000-0003"}
//! ```
//!
//! and responses by `status`:
//!
//! ```json
//! {"status": "success", "body": {"summary": "Page is about X."}}
//! {"status": "failure", "body": {"code": "credentialMissing"}}
//! ```
//!
//! Inside the process a request travels as an [`Envelope`] that carries a
//! [`RequestId`] for log correlation and a oneshot sender for the reply.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::Failure;
use crate::record::{NewSummary, SummaryRecord};

/// Every message kind the coordinator understands.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Request {
    /// Read the history, newest first.
    GetSummaries,
    /// Append a record and trim the history.
    SaveSummary { summary: NewSummary },
    /// Remove a record. Missing ids are not an error.
    DeleteSummary { id: String },
    /// Remove every record.
    ClearAll,
    /// Summarize `content` with the stored credential.
    GenerateSummary { content: String },
    /// Replace the stored credential.
    SaveApiKey {
        #[serde(rename = "apiKey")]
        api_key: String,
    },
    /// Read the stored credential.
    GetApiKey,
}

impl Request {
    /// The wire name of this request's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::GetSummaries => "getSummaries",
            Request::SaveSummary { .. } => "saveSummary",
            Request::DeleteSummary { .. } => "deleteSummary",
            Request::ClearAll => "clearAll",
            Request::GenerateSummary { .. } => "generateSummary",
            Request::SaveApiKey { .. } => "saveApiKey",
            Request::GetApiKey => "getApiKey",
        }
    }

    /// Whether handling this request can change the summary history.
    pub fn mutates_summaries(&self) -> bool {
        matches!(
            self,
            Request::SaveSummary { .. } | Request::DeleteSummary { .. } | Request::ClearAll
        )
    }
}

/// Success payloads.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Reply {
    Summaries(Vec<SummaryRecord>),
    Ack,
    Summary(String),
    ApiKey(Option<String>),
}

/// The single answer to a [`Request`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", content = "body", rename_all = "camelCase")]
pub enum Response {
    Success(Reply),
    Failure(Failure),
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn into_result(self) -> Result<Reply, Failure> {
        match self {
            Response::Success(reply) => Ok(reply),
            Response::Failure(failure) => Err(failure),
        }
    }
}

impl From<Result<Reply, Failure>> for Response {
    fn from(result: Result<Reply, Failure>) -> Self {
        match result {
            Ok(reply) => Response::Success(reply),
            Err(failure) => Response::Failure(failure),
        }
    }
}

/// Correlation id assigned to each request as it enters the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Next id from a process-wide counter.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        RequestId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rq-{:06}", self.0)
    }
}

/// A request in flight to the coordinator, with its single-use reply slot.
pub struct Envelope {
    pub id: RequestId,
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

impl Envelope {
    /// Create an envelope and the receiver its reply will arrive on.
    pub fn new(request: Request) -> (Self, oneshot::Receiver<Response>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                id: RequestId::next(),
                request,
                reply,
            },
            rx,
        )
    }

    /// Deliver the response. A caller that stopped waiting is not an error.
    pub fn respond(self, response: Response) -> bool {
        self.reply.send(response).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_parse_from_kind_tag() {
        let req: Request =
            serde_json::from_value(json!({"kind": "generateSummary", "content": "text"})).unwrap();
        assert_eq!(
            req,
            Request::GenerateSummary {
                content: "text".into()
            }
        );

        let req: Request = serde_json::from_value(json!({"kind": "getSummaries"})).unwrap();
        assert_eq!(req, Request::GetSummaries);

        let req: Request =
            serde_json::from_value(json!({"kind": "saveApiKey", "apiKey": "sk-1"})).unwrap();
        assert_eq!(
            req,
            Request::SaveApiKey {
                api_key: "sk-1".into()
            }
        );
    }

    #[test]
    fn unknown_kind_does_not_parse() {
        let parsed = serde_json::from_value::<Request>(json!({"kind": "formatDisk"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn kind_matches_wire_tag() {
        let req = Request::DeleteSummary { id: "x".into() };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["kind"], req.kind());
        assert!(req.mutates_summaries());
        assert!(!Request::GetApiKey.mutates_summaries());
    }

    #[test]
    fn response_wire_shape() {
        let ok = Response::Success(Reply::Summary("Page is about X.".into()));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["body"]["summary"], "Page is about X.");

        let ack = serde_json::to_value(Response::Success(Reply::Ack)).unwrap();
        assert_eq!(ack["body"], "ack");

        let err = Response::Failure(Failure::CredentialMissing);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["body"]["code"], "credentialMissing");
    }

    #[test]
    fn request_ids_increase() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert!(b > a);
        assert!(a.to_string().starts_with("rq-"));
    }

    #[tokio::test]
    async fn envelope_delivers_once() {
        let (envelope, rx) = Envelope::new(Request::GetApiKey);
        assert!(envelope.respond(Response::Success(Reply::ApiKey(None))));
        assert_eq!(rx.await.unwrap(), Response::Success(Reply::ApiKey(None)));
    }

    #[tokio::test]
    async fn envelope_tolerates_dropped_caller() {
        let (envelope, rx) = Envelope::new(Request::ClearAll);
        drop(rx);
        assert!(!envelope.respond(Response::Success(Reply::Ack)));
    }
}
