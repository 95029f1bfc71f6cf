use bytes::{BufMut, Bytes, BytesMut};
use tracing::{trace, warn};

use super::ie::{self, BearerCapability, CauseIe, ProgressDescription};
use super::{InformationElement, MessageType, ie_code};
use crate::error::{Result, WireError, ensure};
use crate::uuie::UserUserPdu;

pub const Q931_PROTOCOL_DISCRIMINATOR: u8 = 0x08;

/// Protocol discriminator octet leading the User-User contents (X.208/X.209)
const USER_USER_PROTOCOL: u8 = 0x05;

const HEADER_LEN: usize = 5;

/// Element codes the typed fields own; raw copies of these are not re-encoded
const TYPED_CODES: [u8; 8] = [
    ie_code::BEARER_CAPABILITY,
    ie_code::CAUSE,
    ie_code::PROGRESS_INDICATOR,
    ie_code::DISPLAY,
    ie_code::KEYPAD,
    ie_code::CALLING_PARTY_NUMBER,
    ie_code::CALLED_PARTY_NUMBER,
    ie_code::USER_USER,
];

/// A decoded or to-be-encoded Q.931 message
///
/// `elements` holds every information element in wire order after a
/// decode. The typed fields are filled from the elements this stack
/// understands. On encode the typed fields win and any other raw element
/// is merged in by code.
#[derive(Debug, Clone, PartialEq)]
pub struct Q931Message {
    pub call_reference: u16,
    pub from_destination: bool,
    pub message_type: MessageType,
    pub elements: Vec<InformationElement>,
    pub bearer_capability: Option<BearerCapability>,
    pub cause: Option<CauseIe>,
    pub progress: Option<u8>,
    pub display: Option<String>,
    pub keypad: Option<String>,
    pub calling_party_number: Option<String>,
    pub called_party_number: Option<String>,
    pub user_user: Option<UserUserPdu>,
}

impl Q931Message {
    pub fn new(message_type: MessageType, call_reference: u16, from_destination: bool) -> Self {
        Self {
            call_reference,
            from_destination,
            message_type,
            elements: Vec::new(),
            bearer_capability: None,
            cause: None,
            progress: None,
            display: None,
            keypad: None,
            calling_party_number: None,
            called_party_number: None,
            user_user: None,
        }
    }

    /// First raw element with the given code
    pub fn element(&self, code: u8) -> Option<&InformationElement> {
        self.elements.iter().find(|e| e.code == code)
    }

    pub fn decode(data: Bytes) -> Result<Self> {
        ensure(HEADER_LEN, data.len())?;
        if data[0] != Q931_PROTOCOL_DISCRIMINATOR {
            return Err(WireError::InvalidProtocolDiscriminator(data[0]));
        }
        if data[1] != 2 {
            return Err(WireError::InvalidCallReferenceLength(data[1]));
        }
        let call_reference = (u16::from(data[2] & 0x7f) << 8) | u16::from(data[3]);
        let from_destination = data[2] & 0x80 != 0;
        let message_type = MessageType::from(data[4]);

        let mut msg = Self::new(message_type, call_reference, from_destination);

        let mut offset = HEADER_LEN;
        while offset < data.len() {
            let code = data[offset];
            offset += 1;

            if ie_code::is_single_octet(code) {
                msg.elements.push(InformationElement::new(code, Bytes::new()));
                continue;
            }

            let length = if code == ie_code::USER_USER {
                ensure(offset + 2, data.len())?;
                let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
                offset += 2;
                len
            } else {
                ensure(offset + 1, data.len())?;
                let len = data[offset] as usize;
                offset += 1;
                len
            };

            if offset + length > data.len() {
                return Err(WireError::ElementOverrun {
                    code,
                    length,
                    remaining: data.len() - offset,
                });
            }
            let value = data.slice(offset..offset + length);
            offset += length;

            trace!(code, length, "Q.931 element");
            msg.apply_element(code, &value)?;
            msg.elements.push(InformationElement::new(code, value));
        }

        if msg.message_type.carries_user_user() && msg.user_user.is_none() {
            return Err(WireError::MissingUserUser {
                message_type: msg.message_type.to_string(),
            });
        }

        Ok(msg)
    }

    /// Fill the typed field for one element. Only the User-User element is
    /// allowed to fail the whole message.
    fn apply_element(&mut self, code: u8, value: &Bytes) -> Result<()> {
        let outcome = match code {
            ie_code::BEARER_CAPABILITY => {
                self.bearer_capability = BearerCapability::from_octets(value);
                Ok(())
            }
            ie_code::CAUSE => CauseIe::decode(value).map(|c| self.cause = Some(c)),
            ie_code::PROGRESS_INDICATOR => {
                ProgressDescription::decode(value).map(|p| self.progress = Some(p))
            }
            ie_code::DISPLAY => {
                self.display = Some(ie::decode_display(value));
                Ok(())
            }
            ie_code::KEYPAD => {
                self.keypad = Some(String::from_utf8_lossy(value).into_owned());
                Ok(())
            }
            ie_code::CALLING_PARTY_NUMBER => {
                ie::decode_calling_number(value).map(|n| self.calling_party_number = Some(n))
            }
            ie_code::CALLED_PARTY_NUMBER => {
                ie::decode_called_number(value).map(|n| self.called_party_number = Some(n))
            }
            ie_code::USER_USER => {
                if !self.message_type.carries_user_user() {
                    return Ok(());
                }
                let Some(&protocol) = value.first() else {
                    return Err(WireError::InvalidUserUser("empty element".into()));
                };
                if protocol != USER_USER_PROTOCOL {
                    warn!(protocol, "Unexpected user-user protocol discriminator");
                }
                let pdu = UserUserPdu::decode(value.slice(1..))
                    .map_err(|e| WireError::InvalidUserUser(e.to_string()))?;
                self.user_user = Some(pdu);
                return Ok(());
            }
            _ => Ok(()),
        };
        if let Err(e) = outcome {
            warn!(code, error = %e, "Ignoring undecodable element");
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut out: Vec<(u8, Bytes)> = Vec::new();

        if let Some(bearer) = &self.bearer_capability {
            out.push((ie_code::BEARER_CAPABILITY, Bytes::copy_from_slice(&bearer.octets())));
        }
        if let Some(cause) = &self.cause {
            out.push((ie_code::CAUSE, Bytes::copy_from_slice(&cause.octets())));
        }
        if let Some(progress) = self.progress {
            out.push((
                ie_code::PROGRESS_INDICATOR,
                Bytes::copy_from_slice(&ProgressDescription::octets(progress)),
            ));
        }
        if let Some(display) = &self.display {
            out.push((ie_code::DISPLAY, ie::encode_display(display)));
        }
        if let Some(keypad) = &self.keypad {
            out.push((ie_code::KEYPAD, Bytes::copy_from_slice(keypad.as_bytes())));
        }
        if let Some(number) = &self.calling_party_number {
            out.push((ie_code::CALLING_PARTY_NUMBER, ie::encode_calling_number(number)));
        }
        if let Some(number) = &self.called_party_number {
            out.push((ie_code::CALLED_PARTY_NUMBER, ie::encode_called_number(number)));
        }
        if let Some(uuie) = &self.user_user {
            let pdu = uuie.encode()?;
            let mut value = BytesMut::with_capacity(pdu.len() + 1);
            value.put_u8(USER_USER_PROTOCOL);
            value.put_slice(&pdu);
            out.push((ie_code::USER_USER, value.freeze()));
        }
        out.extend(
            self.elements
                .iter()
                .filter(|e| !TYPED_CODES.contains(&e.code))
                .map(|e| (e.code, e.data.clone())),
        );
        out.sort_by_key(|(code, _)| *code);

        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(Q931_PROTOCOL_DISCRIMINATOR);
        buf.put_u8(2);
        let mut high = ((self.call_reference >> 8) & 0x7f) as u8;
        if self.from_destination {
            high |= 0x80;
        }
        buf.put_u8(high);
        buf.put_u8((self.call_reference & 0xff) as u8);
        buf.put_u8(self.message_type.value());

        for (code, value) in out {
            buf.put_u8(code);
            if ie_code::is_single_octet(code) {
                continue;
            }
            if code == ie_code::USER_USER {
                let len = u16::try_from(value.len())
                    .map_err(|_| WireError::encode("user-user element too long"))?;
                buf.put_u16(len);
            } else {
                let len = u8::try_from(value.len()).map_err(|_| {
                    WireError::encode(format!("element {:#04x} too long: {}", code, value.len()))
                })?;
                buf.put_u8(len);
            }
            buf.put_slice(&value);
        }

        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cause::Q931Cause;
    use crate::uuie::UuieBody;

    fn notify(call_reference: u16) -> Q931Message {
        Q931Message::new(MessageType::Notify, call_reference, false)
    }

    #[test]
    fn test_header_layout() {
        let mut msg = notify(0x1234);
        msg.from_destination = true;
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes.as_ref(), &[0x08, 0x02, 0x92, 0x34, 0x6e]);

        let decoded = Q931Message::decode(bytes).unwrap();
        assert_eq!(decoded.call_reference, 0x1234);
        assert!(decoded.from_destination);
        assert_eq!(decoded.message_type, MessageType::Notify);
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(
            Q931Message::decode(Bytes::from_static(&[0x08, 0x02, 0x00])),
            Err(WireError::TooShort { required: 5, available: 3 })
        ));
        assert_eq!(
            Q931Message::decode(Bytes::from_static(&[0x08, 0x01, 0x00, 0x01, 0x6e])),
            Err(WireError::InvalidCallReferenceLength(1))
        );
        assert_eq!(
            Q931Message::decode(Bytes::from_static(&[0x08, 0x02, 0x00, 0x01, 0x6e, 0x28, 0x09, b'a'])),
            Err(WireError::ElementOverrun { code: 0x28, length: 9, remaining: 1 })
        );
    }

    #[test]
    fn test_missing_user_user() {
        let data = Bytes::from_static(&[0x08, 0x02, 0x00, 0x01, 0x05]);
        assert!(matches!(
            Q931Message::decode(data),
            Err(WireError::MissingUserUser { .. })
        ));
    }

    #[test]
    fn test_unknown_elements_preserved_in_order() {
        let data = Bytes::from_static(&[
            0x08, 0x02, 0x00, 0x07, 0x6e, 0x27, 0x01, 0xaa, 0xa1, 0x08, 0x02, 0x80, 0x90,
        ]);
        let msg = Q931Message::decode(data).unwrap();
        let codes: Vec<u8> = msg.elements.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![0x27, 0xa1, 0x08]);
        assert_eq!(msg.cause.unwrap().cause, Q931Cause::NormalCallClearing);
        assert!(msg.element(0xa1).unwrap().data.is_empty());
    }

    #[test]
    fn test_bad_semantic_element_ignored() {
        // one-octet cause cannot be decoded, message still is
        let data = Bytes::from_static(&[0x08, 0x02, 0x00, 0x07, 0x6e, 0x08, 0x01, 0x80]);
        let msg = Q931Message::decode(data).unwrap();
        assert!(msg.cause.is_none());
        assert_eq!(msg.elements.len(), 1);
    }

    #[test]
    fn test_elements_encoded_in_code_order() {
        let mut msg = Q931Message::new(MessageType::ReleaseComplete, 9, true);
        msg.user_user = Some(UserUserPdu::new(UuieBody::ReleaseComplete {
            protocol_identifier: crate::uuie::H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: None,
            reason: None,
        }));
        msg.display = Some("gw".into());
        msg.cause = Some(CauseIe::new(Q931Cause::UserBusy));
        msg.elements.push(InformationElement::new(0x34, vec![0x01]));

        let decoded = Q931Message::decode(msg.encode().unwrap()).unwrap();
        let codes: Vec<u8> = decoded.elements.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![0x08, 0x28, 0x34, 0x7e]);
        assert_eq!(decoded.display.as_deref(), Some("gw"));
        assert_eq!(decoded.user_user, msg.user_user);
    }

    #[test]
    fn test_invalid_user_user_is_structural() {
        let data = Bytes::from_static(&[0x08, 0x02, 0x00, 0x01, 0x05, 0x7e, 0x00, 0x03, 0x05, 0x01, 0x00]);
        let err = Q931Message::decode(data).unwrap_err();
        assert!(matches!(err, WireError::InvalidUserUser(_)));
        assert!(err.is_structural());
    }
}
