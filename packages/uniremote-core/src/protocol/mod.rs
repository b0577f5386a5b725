//! Wire protocol spoken with the desktop companion.
//!
//! - [`Command`]: outbound instructions, `verb` or `verb:argument` UTF-8 strings
//! - [`Payload`] / [`Envelope`]: first-phase classification of inbound bytes
//! - [`InboundMessage`]: typed inbound messages produced by [`Envelope::decode`]

mod command;
mod inbound;
mod lenient;

pub use command::{Command, CommandParseError};
pub use inbound::{
    Album, Artist, ArtworkItem, Envelope, InboundMessage, MessageError, NowPlaying, Payload,
    PayloadError, SearchResult, Song, ALL_SCOPE,
};
