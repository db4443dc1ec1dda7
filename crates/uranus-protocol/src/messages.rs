//! Tagged JSON documents exchanged with hackernel

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Event classes the agent can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    #[serde(rename = "audit::proc::report")]
    ProcAudit,
    #[serde(rename = "osinfo::report")]
    OsInfo,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::ProcAudit => "audit::proc::report",
            Section::OsInfo => "osinfo::report",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent to kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "user::proc::enable")]
    ProcEnable,
    #[serde(rename = "user::proc::disable")]
    ProcDisable,
    #[serde(rename = "user::msg::sub")]
    Subscribe { section: Section },
    #[serde(rename = "user::msg::unsub")]
    Unsubscribe { section: Section },
    #[serde(rename = "user::proc::trusted::insert")]
    TrustedInsert { cmd: String },
}

impl OutboundMessage {
    pub fn trusted_insert(cmd: impl Into<String>) -> Self {
        OutboundMessage::TrustedInsert { cmd: cmd.into() }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Kernel to agent. Tags the agent does not consume decode as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "audit::proc::report")]
    ProcAuditReport { cmd: String, judge: i64 },
    #[serde(rename = "osinfo::report")]
    OsInfoReport,
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Fails on invalid JSON, a missing `type`, or a known type with a
    /// malformed payload.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_wire_format() {
        assert_eq!(
            OutboundMessage::ProcEnable.encode().unwrap(),
            r#"{"type":"user::proc::enable"}"#
        );
        assert_eq!(
            OutboundMessage::Subscribe { section: Section::ProcAudit }.encode().unwrap(),
            r#"{"type":"user::msg::sub","section":"audit::proc::report"}"#
        );
        assert_eq!(
            OutboundMessage::Unsubscribe { section: Section::OsInfo }.encode().unwrap(),
            r#"{"type":"user::msg::unsub","section":"osinfo::report"}"#
        );
    }

    #[test]
    fn test_trusted_insert_keeps_separator() {
        let msg = OutboundMessage::trusted_insert("/home\u{1f}/bin/ls\u{1f}-la");
        let text = msg.encode().unwrap();
        assert!(text.contains(r#""type":"user::proc::trusted::insert""#));
        assert_eq!(OutboundMessage::decode(&text).unwrap(), msg);
    }

    #[test]
    fn test_decode_audit_report() {
        let msg = InboundMessage::decode(
            r#"{"type":"audit::proc::report","cmd":"/home\u001f/bin/ls\u001f-la","judge":1}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            InboundMessage::ProcAuditReport {
                cmd: "/home\u{1f}/bin/ls\u{1f}-la".to_string(),
                judge: 1,
            }
        );
    }

    #[test]
    fn test_decode_heartbeat_with_payload() {
        let msg = InboundMessage::decode(r#"{"type":"osinfo::report","cpu":0.5,"mem":1024}"#).unwrap();
        assert_eq!(msg, InboundMessage::OsInfoReport);
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let msg = InboundMessage::decode(r#"{"type":"user::msg::sub","code":0,"section":"x"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unknown);
    }

    #[test]
    fn test_malformed_documents_rejected() {
        assert!(InboundMessage::decode("not json").is_err());
        assert!(InboundMessage::decode(r#"{"cmd":"x","judge":1}"#).is_err());
        assert!(InboundMessage::decode(r#"{"type":"audit::proc::report","judge":1}"#).is_err());
        assert!(InboundMessage::decode(r#"{"type":"audit::proc::report","cmd":"x","judge":"yes"}"#).is_err());
    }
}
