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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("IO error {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed frame")]
    MalformedFrame,

    #[error("Frame exceeds maximum length ({0} bytes)")]
    FrameTooLarge(usize),

    #[error("Mismatching protocol version, expected {expected}, received {received}")]
    VersionMismatch { expected: u8, received: u8 },

    #[error("Invalid message variant {0}")]
    InvalidMessageVariant(u8),
}
