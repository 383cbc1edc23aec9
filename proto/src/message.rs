// distmx-proto - wire messages and framing shared by the print-mutex peer
// and printer binaries.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::convert::TryFrom;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use nom::bytes::complete::{tag, take_while};
use nom::combinator::{map, map_res};
use nom::number::complete::{le_i32, le_i64, le_u8};
use nom::sequence::terminated;
use nom::IResult;

use crate::error::ProtoError;

pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ProtocolVersion(u8);

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Header {
    /// Current protocol version. Checked to ensure proper parsing on both
    /// sides; all peers and the printer MUST run the same schema.
    pub protocol_version: ProtocolVersion,

    /// Message variant to indicate parsing procedure.
    pub variant: Variant,
}

/// Message variants for parsing procedure hint. `MutualExclusionService`
/// and `PrintingService` share one tag space rather than two separate
/// enums, keeping header parsing uniform across both services.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Variant {
    /// `MutualExclusionService::RequestAccess` request.
    AccessRequest = 0,

    /// `MutualExclusionService::RequestAccess` response. `access_granted`
    /// is always true on the wire; deferral blocks the response rather
    /// than sending a negative one.
    AccessResponse = 1,

    /// `MutualExclusionService::ReleaseAccess` request.
    AccessRelease = 2,

    /// `MutualExclusionService::ReleaseAccess` response (`Empty`).
    ReleaseAck = 3,

    /// `PrintingService::SendToPrinter` request.
    PrintRequest = 4,

    /// `PrintingService::SendToPrinter` response.
    PrintResponse = 5,
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value != PROTOCOL_VERSION {
            return Err(ProtoError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                received: value,
            });
        }

        Ok(Self(value))
    }
}

impl TryFrom<u8> for Variant {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == Variant::AccessRequest as u8 => Ok(Variant::AccessRequest),
            x if x == Variant::AccessResponse as u8 => Ok(Variant::AccessResponse),
            x if x == Variant::AccessRelease as u8 => Ok(Variant::AccessRelease),
            x if x == Variant::ReleaseAck as u8 => Ok(Variant::ReleaseAck),
            x if x == Variant::PrintRequest as u8 => Ok(Variant::PrintRequest),
            x if x == Variant::PrintResponse as u8 => Ok(Variant::PrintResponse),
            x => Err(ProtoError::InvalidMessageVariant(x)),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Header {
    pub fn new(variant: Variant) -> Self {
        Self {
            protocol_version: ProtocolVersion(PROTOCOL_VERSION),
            variant,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Header> {
        let (input, protocol_version) = map_res(le_u8, ProtocolVersion::try_from)(input)?;
        let (input, variant) = map_res(le_u8, Variant::try_from)(input)?;

        Ok((
            input,
            Header {
                protocol_version,
                variant,
            },
        ))
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();

        buf.put_u8(self.protocol_version.0);
        buf.put_u8(self.variant as u8);

        buf
    }
}

/// `AccessRequest { int32 client_id; int64 lamport_timestamp; int32 request_number; }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub client_id: i32,
    pub lamport_timestamp: i64,
    pub request_number: i32,
}

/// `AccessResponse { bool access_granted; int64 lamport_timestamp; int32 responder_id; }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessResponse {
    pub access_granted: bool,
    pub lamport_timestamp: i64,
    pub responder_id: i32,
}

/// `AccessRelease { int32 client_id; int64 lamport_timestamp; }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRelease {
    pub client_id: i32,
    pub lamport_timestamp: i64,
}

/// Empty acknowledgement of a `ReleaseAccess` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReleaseAck;

/// `PrintRequest { int32 client_id; string message; int64 lamport_timestamp; }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintRequest {
    pub client_id: i32,
    pub message: String,
    pub lamport_timestamp: i64,
}

/// `PrintResponse { bool success; string confirmation_message; int64 lamport_timestamp; }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintResponse {
    pub success: bool,
    pub confirmation_message: String,
    pub lamport_timestamp: i64,
}

impl AccessRequest {
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Header::new(Variant::AccessRequest).to_bytes();

        buf.put_i32_le(self.client_id);
        buf.put_i64_le(self.lamport_timestamp);
        buf.put_i32_le(self.request_number);

        buf.freeze()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], AccessRequest> {
        let (input, client_id) = le_i32(input)?;
        let (input, lamport_timestamp) = le_i64(input)?;
        let (input, request_number) = le_i32(input)?;

        Ok((
            input,
            AccessRequest {
                client_id,
                lamport_timestamp,
                request_number,
            },
        ))
    }
}

impl AccessResponse {
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Header::new(Variant::AccessResponse).to_bytes();

        buf.put_u8(self.access_granted as u8);
        buf.put_i64_le(self.lamport_timestamp);
        buf.put_i32_le(self.responder_id);

        buf.freeze()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], AccessResponse> {
        let (input, access_granted) = map(le_u8, |v| v != 0)(input)?;
        let (input, lamport_timestamp) = le_i64(input)?;
        let (input, responder_id) = le_i32(input)?;

        Ok((
            input,
            AccessResponse {
                access_granted,
                lamport_timestamp,
                responder_id,
            },
        ))
    }
}

impl AccessRelease {
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Header::new(Variant::AccessRelease).to_bytes();

        buf.put_i32_le(self.client_id);
        buf.put_i64_le(self.lamport_timestamp);

        buf.freeze()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], AccessRelease> {
        let (input, client_id) = le_i32(input)?;
        let (input, lamport_timestamp) = le_i64(input)?;

        Ok((
            input,
            AccessRelease {
                client_id,
                lamport_timestamp,
            },
        ))
    }
}

impl ReleaseAck {
    pub fn to_bytes(&self) -> Bytes {
        Header::new(Variant::ReleaseAck).to_bytes().freeze()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ReleaseAck> {
        Ok((input, ReleaseAck))
    }
}

impl PrintRequest {
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Header::new(Variant::PrintRequest).to_bytes();

        buf.put_i32_le(self.client_id);
        put_cstring(&mut buf, &self.message);
        buf.put_i64_le(self.lamport_timestamp);

        buf.freeze()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], PrintRequest> {
        let (input, client_id) = le_i32(input)?;
        let (input, message) = parse_cstring(input)?;
        let (input, lamport_timestamp) = le_i64(input)?;

        Ok((
            input,
            PrintRequest {
                client_id,
                message,
                lamport_timestamp,
            },
        ))
    }
}

impl PrintResponse {
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Header::new(Variant::PrintResponse).to_bytes();

        buf.put_u8(self.success as u8);
        put_cstring(&mut buf, &self.confirmation_message);
        buf.put_i64_le(self.lamport_timestamp);

        buf.freeze()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], PrintResponse> {
        let (input, success) = map(le_u8, |v| v != 0)(input)?;
        let (input, confirmation_message) = parse_cstring(input)?;
        let (input, lamport_timestamp) = le_i64(input)?;

        Ok((
            input,
            PrintResponse {
                success,
                confirmation_message,
                lamport_timestamp,
            },
        ))
    }
}

fn put_cstring(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

fn parse_cstring(input: &[u8]) -> IResult<&[u8], String> {
    map_res(
        terminated(take_while(|b| b != 0), tag([0])),
        |bytes: &[u8]| std::str::from_utf8(bytes).map(str::to_owned),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_access_request() {
        let msg = AccessRequest {
            client_id: 2,
            lamport_timestamp: 7,
            request_number: 3,
        };

        let bytes = msg.to_bytes();
        let (body, header) = Header::parse(&bytes).unwrap();

        assert_eq!(header.variant, Variant::AccessRequest);

        let (_, parsed) = AccessRequest::parse(body).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn round_trips_access_response() {
        let msg = AccessResponse {
            access_granted: true,
            lamport_timestamp: 11,
            responder_id: 5,
        };

        let bytes = msg.to_bytes();
        let (body, header) = Header::parse(&bytes).unwrap();

        assert_eq!(header.variant, Variant::AccessResponse);

        let (_, parsed) = AccessResponse::parse(body).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn round_trips_print_request_with_message() {
        let msg = PrintRequest {
            client_id: 1,
            message: "message 1 from client 1".to_string(),
            lamport_timestamp: 2,
        };

        let bytes = msg.to_bytes();
        let (body, header) = Header::parse(&bytes).unwrap();

        assert_eq!(header.variant, Variant::PrintRequest);

        let (_, parsed) = PrintRequest::parse(body).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn rejects_mismatched_protocol_version() {
        let payload: &[u8] = &[0x64, Variant::AccessRequest as u8];

        assert_ne!(payload[0], PROTOCOL_VERSION);
        assert!(Header::parse(payload).is_err());
    }

    #[test]
    fn rejects_invalid_variant() {
        let payload: &[u8] = &[PROTOCOL_VERSION, 0x64];

        assert!(Header::parse(payload).is_err());
    }
}
