//! H.245 control messages, capability descriptors and logical channel
//! proposals

pub mod capability;
pub mod message;
pub mod olc;

pub use capability::{
    CapType, CapabilityDirection, GSM_FRAME_OCTETS, MediaCapability, MediaType, PictureFormat,
    TerminalCapability, UserInputCapability,
};
pub use message::{ChannelCloseSource, H245Message, H245MessageKind, MsdDecision, UserInput};
pub use olc::{
    DataType, H2250Parameters, LogicalChannelParameters, OlcDirection, OlcRejectCause,
    OpenLogicalChannel, OpenLogicalChannelAck,
};
