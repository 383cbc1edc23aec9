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

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtoError;

/// Maximum single-frame size. Every message in this schema is a handful of
/// fields plus one short string; anything past this is a malformed peer.
const MAX_FRAME_LEN: usize = 64 * 1024;

const LENGTH_PREFIX_LEN: usize = 4;

/// Frames a persistent `TcpStream` into discrete message bodies (header +
/// payload, still undecoded) by a 4-byte little-endian length prefix.
///
/// A bare `BytesCodec` would hand the handler whatever a single `read()`
/// returned, which is unsound once a persistent connection carries many
/// sequential `AccessRequest`/`AccessResponse` frames back to back, so
/// this codec makes frame boundaries explicit instead.
#[derive(Debug, Default)]
pub struct MessageCodec {
    next_frame_len: Option<usize>,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for MessageCodec {
    type Item = BytesMut;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame_len = match self.next_frame_len {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_PREFIX_LEN {
                    return Ok(None);
                }

                let len = u32::from_le_bytes(src[..LENGTH_PREFIX_LEN].try_into().unwrap());
                let len = len as usize;

                if len > MAX_FRAME_LEN {
                    return Err(ProtoError::FrameTooLarge(len));
                }

                src.advance(LENGTH_PREFIX_LEN);
                self.next_frame_len = Some(len);

                len
            }
        };

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        self.next_frame_len = None;

        Ok(Some(src.split_to(frame_len)))
    }
}

impl Encoder<Bytes> for MessageCodec {
    type Error = ProtoError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_FRAME_LEN {
            return Err(ProtoError::FrameTooLarge(item.len()));
        }

        dst.reserve(LENGTH_PREFIX_LEN + item.len());
        dst.put_u32_le(item.len() as u32);
        dst.put_slice(&item);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_frame_delivered_whole() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(Bytes::from_static(b"hello"), &mut buf).unwrap();

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_frames_delivered_split_across_reads() {
        let mut codec = MessageCodec::new();
        let mut full = BytesMut::new();

        codec.encode(Bytes::from_static(b"distributed"), &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[3..]);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(&frame[..], b"distributed");
    }

    #[test]
    fn decodes_two_frames_delivered_coalesced() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(Bytes::from_static(b"one"), &mut buf).unwrap();
        codec.encode(Bytes::from_static(b"two"), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(&first[..], b"one");
        assert_eq!(&second[..], b"two");
    }
}
