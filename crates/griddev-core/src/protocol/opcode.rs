//! Opcode table, response status codes and endpoint constants.
//!
//! The first byte of every request is an [`Opcode`].  Bit `0x40`
//! ([`RESULT_MASK`]) marks a *result-bearing* request: the caller waits for
//! the response and decodes a payload from it.  Opcodes without the bit are
//! fire-and-forget.

/// TCP port the server listens on.
pub const SERVER_PORT: u16 = 8011;

/// Bit set in the opcode of every request that expects a result payload.
pub const RESULT_MASK: u8 = 0x40;

/// Path of the binary command endpoint.
pub const COMMAND_PATH: &str = "/command";

/// Path of the human-readable statistics page.
pub const STATUS_PATH: &str = "/status";

/// Path of the endpoint that stops the server.
pub const QUIT_PATH: &str = "/quit";

// ── Opcodes ───────────────────────────────────────────────────────────────────

/// Request opcodes understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    CreateImage = 65,
    OpenNewPage = 2,
    Hold = 3,
    Flush = 4,
    Close = 69,
    DrawRect = 6,
    DrawPolyLines = 7,
    DrawPolygon = 8,
    DrawCircle = 9,
    DrawRaster = 10,
    DrawString = 11,
    GetWidth = 76,
    GetHeight = 77,
    GetNativeWidth = 78,
    GetNativeHeight = 79,
    GetStringWidth = 80,
    GetStringHeight = 81,
    CreateDrawingContext = 82,
    ReleaseDrawingContext = 19,
}

impl Opcode {
    /// Returns `true` when the caller waits for a result payload.
    pub fn expects_result(self) -> bool {
        (self as u8) & RESULT_MASK != 0
    }

    /// Returns `true` for the opcodes that do not address an existing device.
    pub fn is_global(self) -> bool {
        matches!(
            self,
            Opcode::CreateImage | Opcode::CreateDrawingContext | Opcode::ReleaseDrawingContext
        )
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            65 => Ok(Opcode::CreateImage),
            2 => Ok(Opcode::OpenNewPage),
            3 => Ok(Opcode::Hold),
            4 => Ok(Opcode::Flush),
            69 => Ok(Opcode::Close),
            6 => Ok(Opcode::DrawRect),
            7 => Ok(Opcode::DrawPolyLines),
            8 => Ok(Opcode::DrawPolygon),
            9 => Ok(Opcode::DrawCircle),
            10 => Ok(Opcode::DrawRaster),
            11 => Ok(Opcode::DrawString),
            76 => Ok(Opcode::GetWidth),
            77 => Ok(Opcode::GetHeight),
            78 => Ok(Opcode::GetNativeWidth),
            79 => Ok(Opcode::GetNativeHeight),
            80 => Ok(Opcode::GetStringWidth),
            81 => Ok(Opcode::GetStringHeight),
            82 => Ok(Opcode::CreateDrawingContext),
            19 => Ok(Opcode::ReleaseDrawingContext),
            _ => Err(()),
        }
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Leading byte of every response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    ServerError = 1,
}

impl TryFrom<u8> for Status {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(Status::Ok),
            1 => Ok(Status::ServerError),
            _ => Err(()),
        }
    }
}
