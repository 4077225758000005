// huesync-core: Entertainment streaming for the Philips Hue bridge
//
// Frame codec, color mapping, the screen/music/cursor sync engines and the
// session that ties an engine to the bridge's encrypted stream.

pub mod codec;
pub mod color;
pub mod error;
pub mod params;
pub mod sampling;
pub mod session;
pub mod sync;
pub mod transport;

pub use codec::{ColorSpace, FrameHeader, build_frame, parse_header};
pub use color::Rgb;
pub use error::CoreError;
pub use params::SyncParameters;
pub use sampling::{
    DisplaySnapshot, PixelBuffer, PointerSampler, Rect, ScreenCapture, SpectrumSource,
};
pub use session::{SessionState, StreamSession, resolve_area};
pub use sync::{CursorSync, EngineCore, MusicSync, ScreenSync, SyncEngine, SyncMode};
pub use transport::{DtlsTarget, EncryptedTransport, FrameSink, STREAMING_PORT, TransportEvent};
