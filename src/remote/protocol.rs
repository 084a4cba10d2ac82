/*!
 * Remote Wire Protocol
 * JSON-shaped requests, responses and notifications for forwarding the
 * provider interface across a transport
 */

use serde::{Deserialize, Serialize};

use crate::capability::ProviderCapabilities;
use crate::types::{
    DeleteOptions, FileChange, FileType, FsError, FsResult, OpenOptions, Stat, WatchOptions,
    WriteFileOptions,
};

/// Pre-allocated read buffer on the serving side; buffers do not cross the
/// boundary by reference
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Provider methods, URI-stringified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method", content = "params")]
pub enum RequestPayload {
    GetCapabilities,
    Stat {
        path: String,
    },
    Readdir {
        path: String,
    },
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: Vec<u8>,
        opts: WriteFileOptions,
    },
    Open {
        path: String,
        opts: OpenOptions,
    },
    Close {
        fd: u64,
    },
    Read {
        fd: u64,
        pos: u64,
        length: u64,
    },
    Write {
        fd: u64,
        pos: u64,
        content: Vec<u8>,
        offset: u64,
        length: u64,
    },
    Mkdir {
        path: String,
    },
    Delete {
        path: String,
        opts: DeleteOptions,
    },
    Rename {
        from: String,
        to: String,
        overwrite: bool,
    },
    Copy {
        from: String,
        to: String,
        overwrite: bool,
    },
    Watch {
        watcher_id: u64,
        path: String,
        opts: WatchOptions,
    },
    Unwatch {
        watcher_id: u64,
    },
}

/// Successful results, one shape per method family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "value")]
pub enum ResponsePayload {
    Capabilities(ProviderCapabilities),
    Stat(Stat),
    Entries(Vec<(String, FileType)>),
    Bytes(Vec<u8>),
    BytesRead { bytes: Vec<u8>, bytes_read: u64 },
    Written(u64),
    Fd(u64),
    Unit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "body")]
pub enum ResponseBody {
    Ok(ResponsePayload),
    Err(FsError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(flatten)]
    pub body: ResponseBody,
}

/// Server-initiated notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event", content = "payload")]
pub enum Notification {
    DidChangeFile(Vec<FileChange>),
    DidChangeCapabilities(ProviderCapabilities),
}

/// Top-level frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

pub fn encode(message: &Message) -> FsResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| FsError::Io(format!("encode failed: {e}")))
}

pub fn decode(frame: &[u8]) -> FsResult<Message> {
    serde_json::from_slice(frame).map_err(|e| FsError::Io(format!("decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;
    use crate::uri::Uri;

    #[test]
    fn test_request_roundtrip() {
        let message = Message::Request(Request {
            id: 7,
            payload: RequestPayload::Read {
                fd: 3,
                pos: 1024,
                length: 65536,
            },
        });
        let decoded = decode(&encode(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_response_error_roundtrip() {
        let message = Message::Response(Response {
            id: 9,
            body: ResponseBody::Err(FsError::FileNotFound("mem:/gone".to_string())),
        });
        let decoded = decode(&encode(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_change_notification_wire_shape() {
        let message = Message::Notification(Notification::DidChangeFile(vec![FileChange::new(
            Uri::parse("mem:/a").unwrap(),
            ChangeKind::Updated,
        )]));
        let json = String::from_utf8(encode(&message).unwrap()).unwrap();
        // Resources travel as strings and change kinds as their numeric values
        assert!(json.contains("\"resource\":\"mem:/a\""));
        assert!(json.contains("\"type\":2"));
    }

    #[test]
    fn test_readdir_entries_are_pairs() {
        let message = Message::Response(Response {
            id: 1,
            body: ResponseBody::Ok(ResponsePayload::Entries(vec![(
                "a.txt".to_string(),
                FileType::File,
            )])),
        });
        let json = String::from_utf8(encode(&message).unwrap()).unwrap();
        assert!(json.contains("[\"a.txt\",\"file\"]"));
    }
}
