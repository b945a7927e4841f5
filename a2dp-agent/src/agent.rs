/*!
 * Agent Object
 * Routes org.bluez.Agent1 method calls to the pairing policy
 */

use dbus::arg::TypeMismatchError;
use dbus::channel::{MatchingReceiver, Sender, Token};
use dbus::message::{MatchRule, MessageType};
use dbus::nonblock::SyncConnection;
use dbus::strings::ErrorName;
use dbus::{Message, Path};
use std::ffi::CString;

use crate::policy::{AgentRequest, Credential, PolicyDecision, PolicyResponder};

pub const AGENT_INTERFACE: &str = "org.bluez.Agent1";

const INVALID_ARGS_ERROR: &str = "org.freedesktop.DBus.Error.InvalidArgs";
const UNKNOWN_METHOD_ERROR: &str = "org.freedesktop.DBus.Error.UnknownMethod";

#[derive(Debug)]
pub enum DecodeError {
    UnknownMethod(String),
    InvalidArgs(TypeMismatchError),
}

impl From<TypeMismatchError> for DecodeError {
    fn from(e: TypeMismatchError) -> Self {
        DecodeError::InvalidArgs(e)
    }
}

/// Decodes an inbound method call by member name.
pub fn decode_request(msg: &Message) -> Result<AgentRequest, DecodeError> {
    let member = msg
        .member()
        .map(|m| m.to_string())
        .unwrap_or_default();

    let request = match member.as_str() {
        "Release" => AgentRequest::Release,
        "AuthorizeService" => {
            let (device, uuid): (Path, &str) = msg.read2()?;
            AgentRequest::AuthorizeService {
                device: device.to_string(),
                uuid: uuid.to_string(),
            }
        }
        "RequestPinCode" => AgentRequest::RequestPinCode {
            device: msg.read1::<Path>()?.to_string(),
        },
        "DisplayPinCode" => {
            let (device, pincode): (Path, &str) = msg.read2()?;
            AgentRequest::DisplayPinCode {
                device: device.to_string(),
                pincode: pincode.to_string(),
            }
        }
        "RequestPasskey" => AgentRequest::RequestPasskey {
            device: msg.read1::<Path>()?.to_string(),
        },
        "DisplayPasskey" => {
            let (device, passkey, entered): (Path, u32, u16) = msg.read3()?;
            AgentRequest::DisplayPasskey {
                device: device.to_string(),
                passkey,
                entered,
            }
        }
        "RequestConfirmation" => {
            let (device, passkey): (Path, u32) = msg.read2()?;
            AgentRequest::RequestConfirmation {
                device: device.to_string(),
                passkey,
            }
        }
        "RequestAuthorization" => AgentRequest::RequestAuthorization {
            device: msg.read1::<Path>()?.to_string(),
        },
        "Cancel" => AgentRequest::Cancel,
        _ => return Err(DecodeError::UnknownMethod(member)),
    };
    Ok(request)
}

/// Builds the reply BlueZ waits on before continuing the pairing step.
pub fn reply_for(msg: &Message, decision: &PolicyDecision) -> Message {
    match decision {
        PolicyDecision::Allow(None) => msg.method_return(),
        PolicyDecision::Allow(Some(Credential::PinCode(pin))) => {
            msg.method_return().append1(pin.as_str())
        }
        PolicyDecision::Allow(Some(Credential::Passkey(passkey))) => {
            msg.method_return().append1(*passkey)
        }
        PolicyDecision::Deny(rejection) => error_reply(msg, rejection.name, rejection.message),
    }
}

fn error_reply(msg: &Message, name: &'static str, text: &str) -> Message {
    let text = CString::new(text.replace('\0', "")).unwrap_or_default();
    msg.error(&ErrorName::from(name), &text)
}

/// Answers a single agent call, or returns None when no reply is wanted.
pub fn handle_call(responder: &PolicyResponder, msg: &Message) -> Option<Message> {
    if msg.msg_type() != MessageType::MethodCall {
        return None;
    }

    let reply = match decode_request(msg) {
        Ok(request) => {
            tracing::debug!("Agent call: {:?}", request);
            reply_for(msg, &responder.respond(&request))
        }
        Err(DecodeError::UnknownMethod(member)) => {
            tracing::debug!("Unknown agent method: {}", member);
            error_reply(msg, UNKNOWN_METHOD_ERROR, &format!("No such method: {}", member))
        }
        Err(DecodeError::InvalidArgs(e)) => {
            tracing::debug!("Malformed agent call: {}", e);
            error_reply(msg, INVALID_ARGS_ERROR, &e.to_string())
        }
    };

    if msg.get_no_reply() {
        None
    } else {
        Some(reply)
    }
}

/// Starts answering agent calls addressed to `path` on the connection.
pub fn export(conn: &SyncConnection, path: Path<'static>, responder: PolicyResponder) -> Token {
    let rule = MatchRule::new_method_call()
        .with_path(path)
        .with_interface(AGENT_INTERFACE);

    conn.start_receive(
        rule,
        Box::new(move |msg, conn| {
            if let Some(reply) = handle_call(&responder, &msg) {
                if conn.send(reply).is_err() {
                    tracing::error!("Failed to send agent reply");
                }
            }
            true
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{A2DP_UUID, REJECTED_ERROR};

    const AGENT_PATH: &str = "/local/a2dpagent";
    const DEVICE: &str = "/org/bluez/hci0/dev_AA_BB";

    fn call(member: &str) -> Message {
        let mut msg = Message::new_method_call(":1.7", AGENT_PATH, AGENT_INTERFACE, member).unwrap();
        msg.set_serial(1);
        msg
    }

    fn device() -> Path<'static> {
        Path::new(DEVICE).unwrap()
    }

    #[test]
    fn decodes_every_agent_method() {
        let cases = vec![
            (call("Release"), AgentRequest::Release),
            (
                call("AuthorizeService").append2(device(), A2DP_UUID),
                AgentRequest::AuthorizeService {
                    device: DEVICE.to_string(),
                    uuid: A2DP_UUID.to_string(),
                },
            ),
            (
                call("RequestPinCode").append1(device()),
                AgentRequest::RequestPinCode { device: DEVICE.to_string() },
            ),
            (
                call("DisplayPinCode").append2(device(), "1234"),
                AgentRequest::DisplayPinCode {
                    device: DEVICE.to_string(),
                    pincode: "1234".to_string(),
                },
            ),
            (
                call("RequestPasskey").append1(device()),
                AgentRequest::RequestPasskey { device: DEVICE.to_string() },
            ),
            (
                call("DisplayPasskey").append3(device(), 123456u32, 2u16),
                AgentRequest::DisplayPasskey {
                    device: DEVICE.to_string(),
                    passkey: 123456,
                    entered: 2,
                },
            ),
            (
                call("RequestConfirmation").append2(device(), 42u32),
                AgentRequest::RequestConfirmation {
                    device: DEVICE.to_string(),
                    passkey: 42,
                },
            ),
            (
                call("RequestAuthorization").append1(device()),
                AgentRequest::RequestAuthorization { device: DEVICE.to_string() },
            ),
            (call("Cancel"), AgentRequest::Cancel),
        ];

        for (msg, expected) in cases {
            assert_eq!(decode_request(&msg).unwrap(), expected);
        }
    }

    #[test]
    fn unknown_member_is_not_decoded() {
        assert!(matches!(
            decode_request(&call("Introspect")),
            Err(DecodeError::UnknownMethod(m)) if m == "Introspect"
        ));
    }

    #[test]
    fn wrong_argument_types_are_not_decoded() {
        let msg = call("RequestPasskey").append1("not an object path");
        assert!(matches!(decode_request(&msg), Err(DecodeError::InvalidArgs(_))));
    }

    #[test]
    fn a2dp_authorization_gets_empty_return() {
        let msg = call("AuthorizeService").append2(device(), A2DP_UUID);
        let reply = handle_call(&PolicyResponder::new(), &msg).unwrap();
        assert_eq!(reply.msg_type(), MessageType::MethodReturn);
        assert!(reply.get_items().is_empty());
    }

    #[test]
    fn foreign_service_gets_rejected_error() {
        let msg = call("AuthorizeService")
            .append2(device(), "0000110a-0000-1000-8000-00805f9b34fb");
        let reply = handle_call(&PolicyResponder::new(), &msg).unwrap();
        assert_eq!(reply.msg_type(), MessageType::Error);
        assert_eq!(reply.read1::<&str>().unwrap(), "Connection rejected");
        let mut reply = reply;
        let err = reply.as_result().unwrap_err();
        assert_eq!(err.name(), Some(REJECTED_ERROR));
    }

    #[test]
    fn pin_and_passkey_are_returned() {
        let responder = PolicyResponder::new();

        let pin = handle_call(&responder, &call("RequestPinCode").append1(device())).unwrap();
        assert_eq!(pin.read1::<&str>().unwrap(), "0000");

        let passkey = handle_call(&responder, &call("RequestPasskey").append1(device())).unwrap();
        assert_eq!(passkey.read1::<u32>().unwrap(), 0);
    }

    #[test]
    fn authorization_request_gets_rejected_error() {
        let msg = call("RequestAuthorization").append1(device());
        let mut reply = handle_call(&PolicyResponder::new(), &msg).unwrap();
        let err = reply.as_result().unwrap_err();
        assert_eq!(err.name(), Some(REJECTED_ERROR));
    }

    #[test]
    fn no_reply_calls_are_not_answered() {
        let mut msg = call("Cancel");
        msg.set_no_reply(true);
        assert!(handle_call(&PolicyResponder::new(), &msg).is_none());
    }
}
