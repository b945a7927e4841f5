/*!
 * Pairing Policy
 * Fixed answers for every org.bluez.Agent1 prompt
 */

use tracing::{debug, info};

/// Advanced Audio Distribution Profile (audio sink) service class UUID.
pub const A2DP_UUID: &str = "0000110d-0000-1000-8000-00805f9b34fb";

pub const FIXED_PIN_CODE: &str = "0000";
pub const FIXED_PASSKEY: u32 = 0;

pub const REJECTED_ERROR: &str = "org.bluez.Error.Rejected";
const REJECTED_MESSAGE: &str = "Connection rejected";

/// One inbound agent prompt, as routed by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentRequest {
    Release,
    AuthorizeService { device: String, uuid: String },
    RequestPinCode { device: String },
    DisplayPinCode { device: String, pincode: String },
    RequestPasskey { device: String },
    DisplayPasskey { device: String, passkey: u32, entered: u16 },
    RequestConfirmation { device: String, passkey: u32 },
    RequestAuthorization { device: String },
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    PinCode(String),
    Passkey(u32),
}

/// Error handed back to BlueZ when a step is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub name: &'static str,
    pub message: &'static str,
}

impl Rejection {
    pub const fn rejected() -> Self {
        Self {
            name: REJECTED_ERROR,
            message: REJECTED_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow(Option<Credential>),
    Deny(Rejection),
}

impl From<Result<(), Rejection>> for PolicyDecision {
    fn from(result: Result<(), Rejection>) -> Self {
        match result {
            Ok(()) => PolicyDecision::Allow(None),
            Err(rejection) => PolicyDecision::Deny(rejection),
        }
    }
}

/// Stateless responder: the same request always yields the same decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyResponder;

impl PolicyResponder {
    pub fn new() -> Self {
        Self
    }

    pub fn respond(&self, request: &AgentRequest) -> PolicyDecision {
        match request {
            AgentRequest::Release => {
                self.release();
                PolicyDecision::Allow(None)
            }
            AgentRequest::AuthorizeService { device, uuid } => {
                self.authorize_service(device, uuid).into()
            }
            AgentRequest::RequestPinCode { device } => {
                PolicyDecision::Allow(Some(Credential::PinCode(self.request_pin_code(device))))
            }
            AgentRequest::DisplayPinCode { device, pincode } => {
                self.display_pin_code(device, pincode);
                PolicyDecision::Allow(None)
            }
            AgentRequest::RequestPasskey { device } => {
                PolicyDecision::Allow(Some(Credential::Passkey(self.request_passkey(device))))
            }
            AgentRequest::DisplayPasskey { device, passkey, entered } => {
                self.display_passkey(device, *passkey, *entered);
                PolicyDecision::Allow(None)
            }
            AgentRequest::RequestConfirmation { device, passkey } => {
                self.request_confirmation(device, *passkey);
                PolicyDecision::Allow(None)
            }
            AgentRequest::RequestAuthorization { device } => {
                self.request_authorization(device).into()
            }
            AgentRequest::Cancel => {
                self.cancel();
                PolicyDecision::Allow(None)
            }
        }
    }

    pub fn release(&self) {
        debug!("Agent released");
    }

    pub fn authorize_service(&self, device: &str, uuid: &str) -> Result<(), Rejection> {
        debug!(device, uuid, "AuthorizeService");
        if uuid.eq_ignore_ascii_case(A2DP_UUID) {
            info!(device, "Authorized A2DP service");
            return Ok(());
        }

        info!(device, uuid, "Rejecting non-A2DP service");
        Err(Rejection::rejected())
    }

    pub fn request_pin_code(&self, device: &str) -> String {
        debug!(device, "RequestPinCode");
        info!(device, "Answering PIN code request");
        FIXED_PIN_CODE.to_string()
    }

    pub fn display_pin_code(&self, device: &str, pincode: &str) {
        debug!(device, pincode, "DisplayPinCode");
    }

    pub fn request_passkey(&self, device: &str) -> u32 {
        debug!(device, "RequestPasskey");
        info!(device, "Answering passkey request");
        FIXED_PASSKEY
    }

    pub fn display_passkey(&self, device: &str, passkey: u32, entered: u16) {
        debug!(device, passkey, entered, "DisplayPasskey");
    }

    /// Returning without error confirms the pairing.
    pub fn request_confirmation(&self, device: &str, passkey: u32) {
        debug!(device, passkey, "RequestConfirmation");
    }

    pub fn request_authorization(&self, device: &str) -> Result<(), Rejection> {
        debug!(device, "RequestAuthorization");
        info!(device, "Rejecting pairing authorization");
        Err(Rejection::rejected())
    }

    pub fn cancel(&self) {
        debug!("Agent request cancelled");
    }
}
