//! Protobuf shape of the signed action envelope.
//!
//! Only the fields a frame action needs are modelled. `MessageData.body` is a
//! `oneof` on the wire; the frame action arm (tag 16) is declared as a plain
//! optional field, which decodes identically, and every other arm is skipped
//! as an unknown field.

/// The signed envelope carried in `trustedData.messageBytes`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Message {
    #[prost(message, optional, tag = "1")]
    pub data: Option<MessageData>,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
    #[prost(int32, tag = "3")]
    pub hash_scheme: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub signature: Vec<u8>,
    #[prost(int32, tag = "5")]
    pub signature_scheme: i32,
    #[prost(bytes = "vec", tag = "6")]
    pub signer: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub data_bytes: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MessageData {
    #[prost(enumeration = "MessageType", tag = "1")]
    pub r#type: i32,
    #[prost(uint64, tag = "2")]
    pub fid: u64,
    #[prost(uint32, tag = "3")]
    pub timestamp: u32,
    #[prost(int32, tag = "4")]
    pub network: i32,
    #[prost(message, optional, tag = "16")]
    pub frame_action_body: Option<FrameActionBody>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FrameActionBody {
    #[prost(bytes = "vec", tag = "1")]
    pub url: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub button_index: u32,
    #[prost(message, optional, tag = "3")]
    pub cast_id: Option<CastIdBody>,
    #[prost(bytes = "vec", tag = "4")]
    pub input_text: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub state: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub transaction_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub address: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CastIdBody {
    #[prost(uint64, tag = "1")]
    pub fid: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    None = 0,
    CastAdd = 1,
    CastRemove = 2,
    ReactionAdd = 3,
    ReactionRemove = 4,
    LinkAdd = 5,
    LinkRemove = 6,
    VerificationAddEthAddress = 7,
    VerificationRemove = 8,
    UserDataAdd = 11,
    UsernameProof = 12,
    FrameAction = 13,
    LinkCompactState = 14,
}

impl MessageType {
    /// Name the hub uses for this type in its JSON representation.
    pub fn hub_name(self) -> &'static str {
        match self {
            Self::None                      => "MESSAGE_TYPE_NONE",
            Self::CastAdd                   => "MESSAGE_TYPE_CAST_ADD",
            Self::CastRemove                => "MESSAGE_TYPE_CAST_REMOVE",
            Self::ReactionAdd               => "MESSAGE_TYPE_REACTION_ADD",
            Self::ReactionRemove            => "MESSAGE_TYPE_REACTION_REMOVE",
            Self::LinkAdd                   => "MESSAGE_TYPE_LINK_ADD",
            Self::LinkRemove                => "MESSAGE_TYPE_LINK_REMOVE",
            Self::VerificationAddEthAddress => "MESSAGE_TYPE_VERIFICATION_ADD_ETH_ADDRESS",
            Self::VerificationRemove        => "MESSAGE_TYPE_VERIFICATION_REMOVE",
            Self::UserDataAdd               => "MESSAGE_TYPE_USER_DATA_ADD",
            Self::UsernameProof             => "MESSAGE_TYPE_USERNAME_PROOF",
            Self::FrameAction               => "MESSAGE_TYPE_FRAME_ACTION",
            Self::LinkCompactState          => "MESSAGE_TYPE_LINK_COMPACT_STATE",
        }
    }
}

/// A decoded envelope together with the exact bytes it was decoded from.
///
/// Hubs validate the original bytes; re-encoding the decoded message would
/// drop fields this crate does not model.
#[derive(Clone, Debug)]
pub struct SignedEnvelope {
    pub bytes: Vec<u8>,
    pub message: Message,
}

impl SignedEnvelope {
    /// Decodes a hex string, with or without a `0x` prefix.
    pub fn from_hex(hex_str: &str) -> Result<Self, crate::Error> {
        use prost::Message as _;

        let bytes = hex::decode(hex_str.trim().trim_start_matches("0x"))?;
        let message = Message::decode(bytes.as_slice())?;
        Ok(Self { bytes, message })
    }

    /// The message type, when it is one this crate knows.
    pub fn message_type(&self) -> Option<MessageType> {
        let data = self.message.data.as_ref()?;
        MessageType::try_from(data.r#type).ok()
    }
}
