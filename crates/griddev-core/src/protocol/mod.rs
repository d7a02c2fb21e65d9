//! Protocol module containing the opcode table and the binary codec.

pub mod codec;
pub mod opcode;

pub use codec::{ProtocolError, WireDecoder, WireEncoder};
pub use opcode::{Opcode, Status, COMMAND_PATH, QUIT_PATH, RESULT_MASK, SERVER_PORT, STATUS_PATH};
