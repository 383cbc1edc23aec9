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

pub mod clock;
pub mod codec;
pub mod error;
pub mod message;

pub use clock::LamportClock;
pub use codec::MessageCodec;
pub use error::ProtoError;
pub use message::{
    AccessRelease, AccessRequest, AccessResponse, Header, PrintRequest, PrintResponse,
    ReleaseAck, Variant, PROTOCOL_VERSION,
};
